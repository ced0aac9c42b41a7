use anyhow::Context;
use ip_network::IpNetwork;
use ip_network_table::IpNetworkTable;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("bad ip format: {0}")]
    BadIpFormat(String),
}

/// Why an IP is refused service. The display form is the reason the SPP
/// sees in the rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum RiskCategory {
    #[strum(serialize = "tor", to_string = "Tor")]
    Tor,
    #[strum(serialize = "public_proxy", to_string = "Public Proxy")]
    PublicProxy,
    #[strum(serialize = "vpn", to_string = "VPN")]
    Vpn,
    #[strum(serialize = "hosting", to_string = "Hosting")]
    Hosting,
    #[strum(serialize = "residential_proxy", to_string = "Residential Proxy")]
    ResidentialProxy,
    #[strum(serialize = "anonymous", to_string = "Anonymous")]
    Anonymous,
}

pub struct GeoService {
    country: IpNetworkTable<String>,
    risk: IpNetworkTable<RiskCategory>,
}

impl GeoService {
    pub fn load(country_path: &Path, risk_path: &Path) -> Result<Self, anyhow::Error> {
        let country_data = std::fs::read_to_string(country_path)
            .with_context(|| format!("cannot read country table {}", country_path.display()))?;
        let risk_data = std::fs::read_to_string(risk_path)
            .with_context(|| format!("cannot read ip risk table {}", risk_path.display()))?;

        Self::from_tables(&country_data, &risk_data)
    }

    pub fn from_tables(country_data: &str, risk_data: &str) -> Result<Self, anyhow::Error> {
        let mut country = IpNetworkTable::new();
        let mut country_rows = 0usize;
        for (network, value) in parse_lines(country_data) {
            country.insert(network, value.to_ascii_uppercase());
            country_rows += 1;
        }

        let mut risk = IpNetworkTable::new();
        let mut risk_rows = 0usize;
        for (network, value) in parse_lines(risk_data) {
            match RiskCategory::from_str(&value) {
                Ok(category) => {
                    risk.insert(network, category);
                    risk_rows += 1;
                }
                Err(_) => warn!(%network, value, "unknown risk category, line skipped"),
            }
        }

        info!(country_rows, risk_rows, "geo tables loaded");

        Ok(GeoService { country, risk })
    }

    /// The risk category the IP falls under, if any. An unparseable IP is
    /// a caller error, not a lookup miss.
    pub fn is_bad(&self, ip: &str) -> Result<Option<RiskCategory>, GeoError> {
        let addr = parse_ip(ip)?;
        Ok(self.risk.longest_match(addr).map(|(_, category)| *category))
    }

    /// ISO-2 country for the IP, empty when no prefix covers it.
    pub fn country_of(&self, ip: &str) -> Result<String, GeoError> {
        let addr = parse_ip(ip)?;
        Ok(self
            .country
            .longest_match(addr)
            .map(|(_, iso)| iso.clone())
            .unwrap_or_default())
    }
}

fn parse_ip(ip: &str) -> Result<IpAddr, GeoError> {
    ip.parse::<IpAddr>()
        .map_err(|_| GeoError::BadIpFormat(ip.to_string()))
}

/// Yields `(network, value)` pairs from `CIDR,value` lines, skipping
/// blanks, comments and junk rows.
fn parse_lines(data: &str) -> impl Iterator<Item = (IpNetwork, String)> + '_ {
    data.lines().filter_map(|line| {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }

        let (cidr, value) = trimmed.split_once(',')?;
        let network = cidr.trim().parse::<IpNetwork>().ok()?;
        Some((network, value.trim().to_string()))
    })
}

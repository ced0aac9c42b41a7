use super::extract;
use super::rule::{
    compile_partner, CompiledRule, CompiledRuleSet, RuleFile, RuleLoadError, RuleValue,
};
use super::value::{Condition, Field};
use crate::ortb::{BidRequest, BidResponse, Version};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::info;

/// Which half of the rule config a load applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Dsp,
    Spp,
}

#[derive(Default)]
struct Snapshot {
    dsp: HashMap<String, CompiledRuleSet>,
    spp: HashMap<String, CompiledRuleSet>,
}

/// Response-side rules the exchange always enforces: a bid without both
/// notice URLs cannot be mediated, so it never reaches the bid engine.
static AUTO_RULES: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| {
    vec![
        CompiledRule {
            field: Field::BidNurl,
            condition: Condition::Exists,
            value: RuleValue::Str(vec![String::new()]),
        },
        CompiledRule {
            field: Field::BidBurl,
            condition: Condition::Exists,
            value: RuleValue::Str(vec![String::new()]),
        },
    ]
});

pub struct FilterManager {
    snapshot: ArcSwap<Snapshot>,
    reload_lock: Mutex<()>,
}

impl Default for FilterManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterManager {
    pub fn new() -> Self {
        FilterManager {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            reload_lock: Mutex::new(()),
        }
    }

    /// Validates and compiles one side of the config, then swaps it in.
    /// Any validation error leaves the active snapshot untouched.
    pub fn install(&self, side: Side, file: &RuleFile) -> Result<usize, RuleLoadError> {
        if file.version.is_empty() {
            return Err(RuleLoadError::MissingVersion);
        }

        let partners = match side {
            Side::Dsp => &file.dsps,
            Side::Spp => &file.spps,
        };

        let mut compiled = HashMap::with_capacity(partners.len());
        for (partner, settings) in partners {
            compiled.insert(partner.clone(), compile_partner(partner, &settings.rules)?);
        }
        let rule_count: usize = compiled.values().map(|set| set.rule_count()).sum();

        let _guard = self.reload_lock.lock();
        let current = self.snapshot.load_full();
        let next = match side {
            Side::Dsp => Snapshot {
                dsp: compiled,
                spp: current.spp.clone(),
            },
            Side::Spp => Snapshot {
                dsp: current.dsp.clone(),
                spp: compiled,
            },
        };
        self.snapshot.store(Arc::new(next));

        info!(?side, partners = partners.len(), rules = rule_count, "rule snapshot installed");

        Ok(rule_count)
    }

    /// Request-side gate, keyed by DSP endpoint. No policy means allow.
    pub fn allow_request(
        &self,
        version: Version,
        dsp_endpoint: &str,
        req: Option<&BidRequest>,
    ) -> bool {
        let Some(req) = req else {
            return false;
        };

        let snapshot = self.snapshot.load();
        match snapshot.dsp.get(dsp_endpoint) {
            None => true,
            Some(set) => set.evaluate(|field| extract::request_value(version, req, field)),
        }
    }

    /// Response-side gate, keyed by SPP endpoint. The notice-URL auto
    /// rules apply even to partners with no configured policy.
    pub fn allow_response(&self, spp_endpoint: &str, resp: Option<&BidResponse>) -> bool {
        let Some(resp) = resp else {
            return false;
        };

        let snapshot = self.snapshot.load();
        if let Some(set) = snapshot.spp.get(spp_endpoint) {
            if !set.evaluate(|field| extract::response_value(resp, field)) {
                return false;
            }
        }

        AUTO_RULES
            .iter()
            .all(|rule| rule.matches(extract::response_value(resp, rule.field)))
    }
}

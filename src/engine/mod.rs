pub mod http;
pub mod pricing;
pub mod wrap;

use crate::ortb::{Bid, BidRequest, BidResponse, SeatBid};
use pricing::clear_price;
use std::collections::HashMap;
use tracing::debug;
use wrap::{wrap_callback, BURL, NURL};

/// The two faces of an auction result: what the SPP is answered with
/// (margin applied, URLs pointing at the exchange) and the raw DSP-priced
/// counterpart kept for accounting.
#[derive(Debug, Clone)]
pub struct WinnerPair {
    pub effective: BidResponse,
    pub by_dsp_price: BidResponse,
}

impl WinnerPair {
    fn empty(request_id: &str) -> Self {
        WinnerPair {
            effective: BidResponse::empty(request_id),
            by_dsp_price: BidResponse::empty(request_id),
        }
    }
}

/// Picks one winner per impression out of all surviving DSP responses.
///
/// Bids are grouped by `impid` in first-seen order and ranked by price
/// descending; the sort is stable, so equal prices keep arrival order and
/// the first-seen bid wins the tie. A group whose top bid cannot clear the
/// floor under any admissible margin emits nothing for that impression.
pub fn select_winners(
    req: &BidRequest,
    responses: &[BidResponse],
    margin: f64,
    exchange_host: &str,
    global_id: &str,
) -> WinnerPair {
    if responses.is_empty() {
        return WinnerPair::empty(&req.id);
    }

    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&Bid>> = HashMap::new();
    for response in responses {
        for bid in response.bids() {
            let group = groups.entry(bid.impid.as_str()).or_insert_with(|| {
                order.push(bid.impid.as_str());
                Vec::new()
            });
            group.push(bid);
        }
    }

    if groups.is_empty() {
        return WinnerPair::empty(&req.id);
    }

    let mut winner_seat = SeatBid::default();
    let mut dsp_price_seat = SeatBid::default();

    for impid in order {
        let Some(group) = groups.get_mut(impid) else {
            continue;
        };
        group.sort_by(|a, b| b.price.total_cmp(&a.price));

        let top = group[0];
        let floor = req.floor_for(impid);

        let Some(cleared) = clear_price(top.price, floor, margin) else {
            debug!(impid, price = top.price, floor, "top bid cannot clear floor");
            continue;
        };

        // The response-side auto rules already drop bids without notice
        // URLs; a bare winner here means a misconfigured upstream.
        let (Some(nurl), Some(burl)) = (top.nurl.as_deref(), top.burl.as_deref()) else {
            debug!(impid, "winning bid lacks notice urls");
            continue;
        };
        if nurl.is_empty() || burl.is_empty() {
            debug!(impid, "winning bid has empty notice urls");
            continue;
        }

        winner_seat.bid.push(Bid {
            id: top.id.clone(),
            impid: top.impid.clone(),
            price: cleared.price,
            adid: top.adid.clone(),
            nurl: Some(wrap_callback(exchange_host, NURL, global_id, nurl)),
            burl: Some(wrap_callback(exchange_host, BURL, global_id, burl)),
            adm: top.adm.clone(),
        });

        dsp_price_seat.bid.push(Bid {
            id: top.id.clone(),
            impid: top.impid.clone(),
            price: top.price,
            ..Default::default()
        });
    }

    WinnerPair {
        effective: BidResponse {
            id: req.id.clone(),
            seatbid: vec![winner_seat],
        },
        by_dsp_price: BidResponse {
            id: req.id.clone(),
            seatbid: vec![dsp_price_seat],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ortb::Imp;

    fn request(floors: &[(&str, f64)]) -> BidRequest {
        BidRequest {
            id: "req-1".into(),
            imp: floors
                .iter()
                .map(|(id, floor)| Imp {
                    id: (*id).into(),
                    bidfloor: *floor,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn bid(id: &str, impid: &str, price: f64) -> Bid {
        Bid {
            id: id.into(),
            impid: impid.into(),
            price,
            adid: Some(format!("ad-{id}")),
            nurl: Some(format!("http://dsp/{id}/win")),
            burl: Some(format!("http://dsp/{id}/bill")),
            ..Default::default()
        }
    }

    fn response(bids: Vec<Bid>) -> BidResponse {
        BidResponse {
            id: "req-1".into(),
            seatbid: vec![SeatBid { seat: None, bid: bids }],
        }
    }

    #[test]
    fn highest_price_wins_and_margin_applies() {
        let req = request(&[("1", 0.5)]);
        let responses = vec![
            response(vec![bid("a", "1", 0.4)]),
            response(vec![bid("b", "1", 0.6)]),
            response(vec![bid("c", "1", 0.9)]),
        ];

        let pair = select_winners(&req, &responses, 0.2, "exchange.example", "g-1");

        let winner = &pair.effective.seatbid[0].bid[0];
        assert_eq!(winner.id, "c");
        assert_eq!(winner.impid, "1");
        assert!((winner.price - 0.72).abs() < 1e-9);

        let raw = &pair.by_dsp_price.seatbid[0].bid[0];
        assert_eq!(raw.price, 0.9);

        let nurl = winner.nurl.as_deref().unwrap();
        assert!(nurl.starts_with("https://exchange.example/nurl?id=g-1&url="));
        let burl = winner.burl.as_deref().unwrap();
        assert!(burl.starts_with("https://exchange.example/burl?id=g-1&url="));
    }

    #[test]
    fn margin_falls_back_to_clear_a_high_floor() {
        let req = request(&[("1", 0.8)]);
        let responses = vec![response(vec![
            bid("a", "1", 0.4),
            bid("b", "1", 0.6),
            bid("c", "1", 0.9),
        ])];

        let pair = select_winners(&req, &responses, 0.2, "exchange.example", "g-2");

        let winner = &pair.effective.seatbid[0].bid[0];
        assert_eq!(winner.id, "c");
        assert!((winner.price - 0.8).abs() < 1e-9);
    }

    #[test]
    fn unclearable_floor_emits_no_winner() {
        let req = request(&[("1", 1.0)]);
        let responses = vec![response(vec![
            bid("a", "1", 0.4),
            bid("b", "1", 0.6),
            bid("c", "1", 0.9),
        ])];

        let pair = select_winners(&req, &responses, 0.2, "exchange.example", "g-3");

        assert_eq!(pair.effective.bid_count(), 0);
        assert_eq!(pair.by_dsp_price.bid_count(), 0);
        assert_eq!(pair.effective.id, "req-1");
    }

    #[test]
    fn empty_input_yields_empty_pair() {
        let req = request(&[("1", 0.5)]);

        let pair = select_winners(&req, &[], 0.2, "exchange.example", "g-4");

        assert_eq!(pair.effective.bid_count(), 0);
        assert_eq!(pair.by_dsp_price.bid_count(), 0);
    }

    #[test]
    fn one_winner_per_impression() {
        let req = request(&[("1", 0.0), ("2", 0.0)]);
        let responses = vec![
            response(vec![bid("a1", "1", 1.0), bid("a2", "2", 2.0)]),
            response(vec![bid("b1", "1", 3.0)]),
        ];

        let pair = select_winners(&req, &responses, 0.0, "exchange.example", "g-5");

        assert_eq!(pair.effective.bid_count(), 2);
        assert!(pair.effective.bid_count() <= req.imp.len());

        let winners = &pair.effective.seatbid[0].bid;
        assert_eq!(winners[0].impid, "1");
        assert_eq!(winners[0].id, "b1");
        assert_eq!(winners[1].impid, "2");
        assert_eq!(winners[1].id, "a2");
    }

    #[test]
    fn equal_prices_tie_break_to_first_seen() {
        let req = request(&[("1", 0.0)]);
        let responses = vec![
            response(vec![bid("first", "1", 1.5)]),
            response(vec![bid("second", "1", 1.5)]),
        ];

        let pair = select_winners(&req, &responses, 0.0, "exchange.example", "g-6");

        assert_eq!(pair.effective.seatbid[0].bid[0].id, "first");
    }

    #[test]
    fn winner_without_notice_urls_is_dropped() {
        let req = request(&[("1", 0.0)]);
        let mut bare = bid("a", "1", 2.0);
        bare.burl = None;
        let responses = vec![response(vec![bare, bid("b", "1", 1.0)])];

        let pair = select_winners(&req, &responses, 0.0, "exchange.example", "g-7");

        // The bare top bid is dropped rather than promoting the runner-up.
        assert_eq!(pair.effective.bid_count(), 0);
    }

    #[test]
    fn bid_for_unknown_impression_defaults_to_zero_floor() {
        let req = request(&[("1", 0.5)]);
        let responses = vec![response(vec![bid("a", "ghost", 0.3)])];

        let pair = select_winners(&req, &responses, 0.0, "exchange.example", "g-8");

        assert_eq!(pair.effective.bid_count(), 1);
        assert_eq!(pair.effective.seatbid[0].bid[0].impid, "ghost");
    }
}

//! RFC 7231 content negotiation.
//!
//! Parses Accept-family headers into quality-ranked specs and picks the best
//! of a caller-supplied offer list. The `Accept` header specifically is
//! cached on the [`Context`](crate::context::Context) so repeated calls
//! within one request reuse the first parse.

use crate::context::Context;
use std::collections::HashMap;

/// Initial capacity of the per-request spec buffer before it grows; it
/// starts at this capacity and only reallocates for unusually large headers.
const SPEC_BUFFER_CAPACITY: usize = 16;

/// One parsed element of an Accept-family header.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptSpec {
    pub value: String,
    /// Fixed-point quality, 0–1000. `-1` marks a parse failure that the fast
    /// path punted on before the float fallback ran (kept for parity with
    /// the debug `raw_quality` field; normal parsing never leaves it at -1).
    pub quality: i32,
    pub params: Option<HashMap<String, String>>,
    pub raw_quality: Option<String>,
}

/// Parse an Accept-family header into its specs, in header order. An empty
/// or whitespace-only header yields an empty list (treated the same
/// as "absent" by [`accepts`]).
pub fn parse_specs(header: &str) -> Vec<AcceptSpec> {
    let mut specs = Vec::with_capacity(SPEC_BUFFER_CAPACITY);
    for part in header.split(',') {
        if let Some(spec) = parse_one(part.trim()) {
            specs.push(spec);
        }
    }
    specs
}

fn parse_one(part: &str) -> Option<AcceptSpec> {
    if part.is_empty() {
        return None;
    }
    let mut pieces = part.split(';');
    let value = pieces.next()?.trim();
    if value.is_empty() {
        return None;
    }

    let mut quality = 1000i32;
    let mut raw_quality = None;
    let mut params = HashMap::new();

    for piece in pieces {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if let Some(q) = piece.strip_prefix("q=") {
            raw_quality = Some(q.to_string());
            quality = parse_quality(q).unwrap_or(1000);
        } else if let Some((k, v)) = piece.split_once('=') {
            params.insert(k.trim().to_string(), v.trim().trim_matches('"').to_string());
        }
    }

    Some(AcceptSpec {
        value: value.to_string(),
        quality,
        params: (!params.is_empty()).then_some(params),
        raw_quality,
    })
}

/// Accept the common `0`, `1`, `0.d`, `0.dd`, `0.ddd` shapes without
/// touching the float parser; anything else falls back to it.
fn parse_quality(s: &str) -> Option<i32> {
    let bytes = s.as_bytes();
    match bytes {
        [b'0'] => Some(0),
        [b'1'] => Some(1000),
        [b'0', b'.', rest @ ..] if rest.len() <= 3 && rest.iter().all(u8::is_ascii_digit) => {
            Some(decimal_to_fixed_point(rest))
        }
        [b'1', b'.', rest @ ..] if rest.len() <= 3 && rest.iter().all(|b| *b == b'0') => Some(1000),
        _ => s
            .parse::<f64>()
            .ok()
            .map(|f| (f.clamp(0.0, 1.0) * 1000.0).round() as i32),
    }
}

fn decimal_to_fixed_point(digits: &[u8]) -> i32 {
    let mut value = 0i32;
    let mut place = 100;
    for &b in digits {
        value += (b - b'0') as i32 * place;
        place /= 10;
    }
    value
}

const ALIASES: &[(&str, &str)] = &[
    ("json", "application/json"),
    ("html", "text/html"),
    ("xml", "application/xml"),
    ("text", "text/plain"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("csv", "text/csv"),
];

fn expand_alias(value: &str) -> &str {
    ALIASES
        .iter()
        .find(|(short, _)| *short == value)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(value)
}

/// `None` if `value` (as a spec from the header) cannot match `offer` at
/// all; otherwise a specificity rank where higher is more specific:
/// exact > `type/*` > `*/*`; prefix match for languages is the weaker form
/// of exact.
fn specificity(value: &str, offer: &str) -> Option<u8> {
    let value = expand_alias(value);
    let offer = expand_alias(offer);

    if value == "*" || value == "*/*" {
        return Some(0);
    }
    if value.eq_ignore_ascii_case(offer) {
        return Some(2);
    }
    if let Some(prefix) = value.strip_suffix("/*") {
        return offer
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(|_| 1);
    }
    if !value.contains('/') {
        let value_primary = value.split('-').next().unwrap_or(value);
        let offer_primary = offer.split('-').next().unwrap_or(offer);
        if value_primary.eq_ignore_ascii_case(offer_primary) {
            return Some(1);
        }
    }
    None
}

/// Pick the best offer per `accepts` algorithm. `specs` empty means
/// the header was absent or parsed to nothing — both return the first offer.
pub fn accepts(specs: &[AcceptSpec], offers: &[&str]) -> Option<String> {
    if specs.is_empty() {
        return offers.first().map(|s| s.to_string());
    }

    // (quality, specificity, header_position) per offer, lower position wins ties.
    let mut best: Option<(i32, u8, usize, usize)> = None;

    for (offer_idx, offer) in offers.iter().enumerate() {
        let mut best_for_offer: Option<(i32, u8, usize)> = None;
        for (pos, spec) in specs.iter().enumerate() {
            let Some(rank) = specificity(&spec.value, offer) else {
                continue;
            };
            let candidate = (spec.quality, rank, pos);
            let better = match best_for_offer {
                None => true,
                Some(b) => {
                    (candidate.0, candidate.1) > (b.0, b.1)
                        || ((candidate.0, candidate.1) == (b.0, b.1) && candidate.2 < b.2)
                }
            };
            if better {
                best_for_offer = Some(candidate);
            }
        }

        if let Some((q, rank, pos)) = best_for_offer {
            let better = match best {
                None => true,
                Some((bq, brank, bpos, _)) => {
                    (q, rank) > (bq, brank) || ((q, rank) == (bq, brank) && pos < bpos)
                }
            };
            if better {
                best = Some((q, rank, pos, offer_idx));
            }
        }
    }

    match best {
        Some((quality, _, _, offer_idx)) if quality > 0 => Some(offers[offer_idx].to_string()),
        _ => None,
    }
}

/// Negotiate the `Accept` header specifically, reusing the context's cached
/// parse when the raw header string is unchanged since the last call within
/// this request.
pub fn negotiate_accept(ctx: &mut Context, header: Option<&str>, offers: &[&str]) -> Option<String> {
    let header = header.unwrap_or("");
    if let Some(cached) = ctx.cached_accept(header) {
        return accepts(cached, offers);
    }
    let specs = parse_specs(header);
    let result = accepts(&specs, offers);
    ctx.cache_accept(header.to_string(), specs);
    result
}

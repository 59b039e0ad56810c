use std::collections::BTreeSet;

/// Widest inclusive range a single `s-e` token may expand to.
const MAX_RANGE_SPAN: u32 = 1000;

/// Parse a port range expression into a sorted, deduplicated list of TCP
/// ports (1..=65535).
///
/// Supported token formats, separated by `,` or the full-width `，`:
/// - single port number: `80`
/// - inclusive range: `8000-8010` (capped at 1000 ports per token)
///
/// Malformed or out-of-range tokens are skipped silently; a scan request is
/// never rejected over one bad token.
pub fn parse_port_expr(expr: &str) -> Vec<u16> {
    let mut set: BTreeSet<u16> = BTreeSet::new();

    for token in expr.replace('，', ",").split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        // Range `start-end`
        if let Some((a, b)) = token.split_once('-') {
            let start = match a.trim().parse::<u32>() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let end = match b.trim().parse::<u32>() {
                Ok(v) => v,
                Err(_) => continue,
            };
            if start == 0 || start > 65535 || end < start {
                continue;
            }
            let end = end.min(start + MAX_RANGE_SPAN - 1).min(65535);
            for p in start..=end {
                set.insert(p as u16);
            }
            continue;
        }

        // Single number
        if let Ok(p) = token.parse::<u32>() {
            if (1..=65535).contains(&p) {
                set.insert(p as u16);
            }
        }
    }

    set.into_iter().collect()
}

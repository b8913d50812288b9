//! Sampling order for pattern learning.
//!
//! Sitemaps tend to open with the homepage, institutional pages, and
//! category links, so samples are drawn from the middle of the list outward
//! and the leading entries are only used once everything else is exhausted.

/// Every index of a list of `len` items, in sampling order.
///
/// Indices at or past `skip_leading` come first, starting from the middle of
/// that range and alternating outward. The skipped leading indices follow,
/// in their original order.
pub fn middle_out_order(len: usize, skip_leading: usize) -> Vec<usize> {
    let skip = skip_leading.min(len);
    let body = len - skip;
    let mut order = Vec::with_capacity(len);

    if body > 0 {
        let mid = skip + body / 2;
        order.push(mid);
        let mut step = 1;
        while order.len() < body {
            if mid + step < len {
                order.push(mid + step);
            }
            if order.len() < body && mid >= skip + step {
                order.push(mid - step);
            }
            step += 1;
        }
    }

    order.extend(0..skip);
    order
}

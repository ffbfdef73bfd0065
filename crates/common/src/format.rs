//! Rupee display formatting.
//!
//! Matches the dashboard's `en-IN` convention: no fraction digits, the last
//! three digits grouped together, every group of two before that
//! (₹12,34,567).

/// Format a whole-rupee amount with Indian digit grouping.
pub fn format_inr(amount: u64) -> String {
    format!("₹{}", group_digits(&amount.to_string()))
}

/// Signed variant for change deltas, e.g. `+₹25` / `-₹120`.
pub fn format_inr_delta(delta: i64) -> String {
    let sign = if delta < 0 { '-' } else { '+' };
    format!("{}₹{}", sign, group_digits(&delta.unsigned_abs().to_string()))
}

fn group_digits(digits: &str) -> String {
    let len = digits.len();
    if len <= 3 {
        return digits.to_string();
    }

    let (head, tail) = digits.split_at(len - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 2 {
        groups.push(&head[end - 2..end]);
        end -= 2;
    }
    groups.push(&head[..end]);

    let mut out = String::with_capacity(len + len / 2);
    for group in groups.iter().rev() {
        out.push_str(group);
        out.push(',');
    }
    out.push_str(tail);
    out
}

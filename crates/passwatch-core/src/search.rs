/// Token-AND, case-insensitive substring match.
///
/// The query is split on single spaces. Consecutive spaces yield empty tokens,
/// which match any candidate, so `"a  b"` behaves like `"a b"`. An empty query
/// matches everything.
pub fn matches(query: &str, candidate: &str) -> bool {
    let query = query.to_lowercase();
    let candidate = candidate.to_lowercase();
    query.split(' ').all(|token| candidate.contains(token))
}

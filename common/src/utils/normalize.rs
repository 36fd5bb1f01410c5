use strsim::levenshtein;

/// Canonical form used for entity identity and tag comparisons: lowercased,
/// all whitespace, hyphens, and underscores removed.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .collect()
}

/// Check whether a candidate label is a near duplicate of a known label,
/// comparing normalized forms by edit distance. Returns the matched known
/// label when one is within `max_distance`.
pub fn find_near_match<'a, I>(candidate: &str, known: I, max_distance: usize) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let normalized_candidate = normalize_name(candidate);
    known.into_iter().find(|existing| {
        levenshtein(&normalized_candidate, &normalize_name(existing)) <= max_distance
    })
}

/// Group items whose normalized keys lie within `max_distance` of each
/// other. Only groups with more than one member are returned.
pub fn find_near_duplicates<T, F>(items: &[T], key_fn: F, max_distance: usize) -> Vec<Vec<&T>>
where
    F: Fn(&T) -> &str,
{
    let keys: Vec<String> = items.iter().map(|item| key_fn(item).to_owned()).collect();
    let mut grouped = vec![false; items.len()];
    let mut groups = Vec::new();

    for i in 0..items.len() {
        if grouped[i] {
            continue;
        }
        let mut group = vec![i];
        for j in (i + 1)..items.len() {
            if grouped[j] {
                continue;
            }
            if levenshtein(&keys[i], &keys[j]) <= max_distance {
                group.push(j);
                grouped[j] = true;
            }
        }
        if group.len() > 1 {
            grouped[i] = true;
            groups.push(group.into_iter().map(|idx| &items[idx]).collect());
        }
    }

    groups
}

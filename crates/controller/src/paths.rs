//! Ancestor-path algebra.
//!
//! A path is the ordered sequence of normalized URLs by which a record was
//! reached from a seed, ending with the record's own URL. Records carry a
//! *set* of paths (JSON array-of-arrays in the store); equality between paths
//! is strict element-wise string equality.

pub type UrlPath = Vec<String>;

pub fn decode_paths(raw: &str) -> serde_json::Result<Vec<UrlPath>> {
    serde_json::from_str(raw)
}

pub fn encode_paths(paths: &[UrlPath]) -> serde_json::Result<String> {
    serde_json::to_string(paths)
}

pub fn decode_urls(raw: &str) -> serde_json::Result<Vec<String>> {
    serde_json::from_str(raw)
}

pub fn encode_urls(urls: &[String]) -> serde_json::Result<String> {
    serde_json::to_string(urls)
}

/// A record is expandable while at least one of its paths is strictly shorter
/// than the depth bound.
pub fn has_expandable_path(paths: &[UrlPath], depth_bound: usize) -> bool {
    paths.iter().any(|p| p.len() < depth_bound)
}

/// True if the normalized URL appears anywhere inside any ancestor path.
/// Children that are their own ancestors are cycles and must not be revisited.
pub fn in_ancestry(paths: &[UrlPath], normalized: &str) -> bool {
    paths.iter().any(|p| p.iter().any(|u| u == normalized))
}

/// Every parent path extended by one hop to the child.
pub fn extended_paths(parent_paths: &[UrlPath], child: &str) -> Vec<UrlPath> {
    parent_paths
        .iter()
        .map(|p| {
            let mut extended = p.clone();
            extended.push(child.to_string());
            extended
        })
        .collect()
}

/// Add each incoming path that has no element-wise-equal counterpart yet.
/// Returns whether the set grew.
pub fn merge_paths(existing: &mut Vec<UrlPath>, incoming: Vec<UrlPath>) -> bool {
    let mut grew = false;
    for path in incoming {
        if !existing.iter().any(|p| *p == path) {
            existing.push(path);
            grew = true;
        }
    }
    grew
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(elems: &[&str]) -> UrlPath {
        elems.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn codec_roundtrips_path_sets() {
        let paths = vec![p(&["//a/", "//b/"]), p(&["//a/", "//c/", "//b/"])];
        let encoded = encode_paths(&paths).unwrap();
        assert_eq!(decode_paths(&encoded).unwrap(), paths);
        assert_eq!(decode_paths("[]").unwrap(), Vec::<UrlPath>::new());
    }

    #[test]
    fn depth_gate_stops_at_bound() {
        // A linear chain A→B→C→D at depth 3: D's single path has length 4,
        // so D is recorded but never expanded.
        let d_paths = vec![p(&["//a/", "//b/", "//c/", "//d/"])];
        assert!(!has_expandable_path(&d_paths, 3));
        assert!(!has_expandable_path(&d_paths, 4));
        assert!(has_expandable_path(&d_paths, 5));

        let seed = vec![p(&["//a/"])];
        assert!(has_expandable_path(&seed, 3));
        assert!(!has_expandable_path(&seed, 1));
    }

    #[test]
    fn one_short_path_keeps_a_record_expandable() {
        let paths = vec![p(&["//a/", "//b/", "//d/"]), p(&["//x/", "//d/"])];
        assert!(has_expandable_path(&paths, 3));
    }

    #[test]
    fn ancestry_detects_cycles() {
        // A→B→A: when B expands, A sits inside B's path and must be dropped.
        let b_paths = vec![p(&["//a/", "//b/"])];
        assert!(in_ancestry(&b_paths, "//a/"));
        assert!(in_ancestry(&b_paths, "//b/"));
        assert!(!in_ancestry(&b_paths, "//c/"));
    }

    #[test]
    fn extended_paths_append_child_to_every_parent_path() {
        let parent = vec![p(&["//a/", "//b/"]), p(&["//a/", "//c/"])];
        let extended = extended_paths(&parent, "//d/");
        assert_eq!(
            extended,
            vec![p(&["//a/", "//b/", "//d/"]), p(&["//a/", "//c/", "//d/"])]
        );
    }

    #[test]
    fn merge_adds_only_new_paths() {
        // Diamond: D reached via B first, then via C. The second merge must
        // add the C path exactly once and a re-merge must be a no-op.
        let mut d_paths = vec![p(&["//a/", "//b/", "//d/"])];

        let via_c = vec![p(&["//a/", "//c/", "//d/"])];
        assert!(merge_paths(&mut d_paths, via_c.clone()));
        assert_eq!(d_paths.len(), 2);

        assert!(!merge_paths(&mut d_paths, via_c));
        assert_eq!(d_paths.len(), 2);

        assert!(!merge_paths(&mut d_paths, vec![p(&["//a/", "//b/", "//d/"])]));
        assert_eq!(d_paths.len(), 2);
    }

    #[test]
    fn merge_distinguishes_elementwise_unequal_paths() {
        let mut existing = vec![p(&["//a/", "//d/"])];
        assert!(merge_paths(&mut existing, vec![p(&["//a/", "//d/", "//e/"])]));
        assert!(merge_paths(&mut existing, vec![p(&["//b/", "//d/"])]));
        assert_eq!(existing.len(), 3);
    }
}

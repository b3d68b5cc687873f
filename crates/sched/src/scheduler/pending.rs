use std::collections::HashMap;

/// Pending-task indexes of a job.
///
/// All three lists are append-only multisets: an index is pushed again every
/// time its task returns to pending, and stale entries stay behind after a
/// launch. Callers filter entries by task state when they scan.
#[derive(Debug, Default, Clone)]
pub struct PendingTasks {
    for_host: HashMap<String, Vec<usize>>,
    no_prefs: Vec<usize>,
    all: Vec<usize>,
}

impl PendingTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `index` under each preferred host, or in the no-preference
    /// bucket when there are none, and always in the fallback list.
    pub fn add(&mut self, index: usize, preferred: &[String]) {
        if preferred.is_empty() {
            self.no_prefs.push(index);
        } else {
            for host in preferred {
                self.for_host.entry(host.clone()).or_default().push(index);
            }
        }
        self.all.push(index);
    }

    /// Concatenate the buckets of every name, in the order given.
    pub fn for_hosts<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<usize> {
        let mut out = Vec::new();
        for name in names {
            out.extend_from_slice(self.for_host(name));
        }
        out
    }

    pub fn for_host(&self, host: &str) -> &[usize] {
        self.for_host.get(host).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn no_prefs(&self) -> &[usize] {
        &self.no_prefs
    }

    pub fn all(&self) -> &[usize] {
        &self.all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_preference_goes_to_no_prefs_bucket() {
        let mut p = PendingTasks::new();
        p.add(0, &[]);
        assert_eq!(p.no_prefs(), &[0]);
        assert_eq!(p.all(), &[0]);
        assert!(p.for_host("node1").is_empty());
    }

    #[test]
    fn preferred_hosts_each_get_the_index() {
        let mut p = PendingTasks::new();
        p.add(3, &hosts(&["node1", "node2"]));
        assert_eq!(p.for_host("node1"), &[3]);
        assert_eq!(p.for_host("node2"), &[3]);
        assert!(p.no_prefs().is_empty());
        assert_eq!(p.all(), &[3]);
    }

    #[test]
    fn re_adding_duplicates_entries() {
        let mut p = PendingTasks::new();
        p.add(1, &hosts(&["node1"]));
        p.add(1, &hosts(&["node1"]));
        assert_eq!(p.for_host("node1"), &[1, 1]);
        assert_eq!(p.all(), &[1, 1]);
    }

    #[test]
    fn for_hosts_unions_in_name_order() {
        let mut p = PendingTasks::new();
        p.add(0, &hosts(&["node1.example.com"]));
        p.add(1, &hosts(&["10.0.0.1"]));
        p.add(2, &hosts(&["node9"]));
        let found = p.for_hosts(["node1", "node1.example.com", "10.0.0.1"]);
        assert_eq!(found, vec![0, 1]);
    }
}

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::{RecordSet, Tag, Work};

/// What a merge did, for logging and CLI output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub added_works: usize,
    pub replaced_works: usize,
    /// Remote works whose id matched a local one that stayed in place.
    pub kept_local: usize,
    pub added_tags: usize,
}

/// Last-write-wins merge of remote works into local ones.
///
/// Local order is kept and unseen remote works are appended in remote order.
/// A remote work replaces its local counterpart only when both carry a
/// `date_updated` and the remote one is strictly later.
pub fn merge_works(local: &[Work], remote: &[Work]) -> (Vec<Work>, MergeReport) {
    let mut merged: Vec<Work> = local.to_vec();
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, w)| (w.id.clone(), i))
        .collect();
    let mut report = MergeReport::default();

    for incoming in remote {
        match index.get(&incoming.id) {
            None => {
                index.insert(incoming.id.clone(), merged.len());
                merged.push(incoming.clone());
                report.added_works += 1;
            }
            Some(&i) => {
                let newer = match (incoming.date_updated, merged[i].date_updated) {
                    (Some(remote_ts), Some(local_ts)) => remote_ts > local_ts,
                    _ => false,
                };
                if newer {
                    merged[i] = incoming.clone();
                    report.replaced_works += 1;
                } else {
                    report.kept_local += 1;
                }
            }
        }
    }

    (merged, report)
}

/// Union by id. A local tag is never overwritten by a remote one.
pub fn merge_tags(local: &[Tag], remote: &[Tag]) -> (Vec<Tag>, usize) {
    let mut merged = local.to_vec();
    let mut seen: HashSet<u32> = merged.iter().map(|t| t.id).collect();
    let mut added = 0;

    for tag in remote {
        if seen.insert(tag.id) {
            merged.push(tag.clone());
            added += 1;
        }
    }

    (merged, added)
}

pub fn merge_records(local: &RecordSet, remote: &RecordSet) -> (RecordSet, MergeReport) {
    let (works, mut report) = merge_works(&local.works, &remote.works);
    let (tags, added_tags) = merge_tags(&local.tags, &remote.tags);
    report.added_tags = added_tags;
    (RecordSet::new(works, tags), report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkType;
    use chrono::{Duration, Utc};

    fn work(id: &str, title: &str) -> Work {
        let mut w = Work::new(title, WorkType::Anime);
        w.id = id.to_string();
        w
    }

    #[test]
    fn test_remote_only_work_is_appended() {
        let local = vec![work("a", "A")];
        let remote = vec![work("b", "B")];
        let (merged, report) = merge_works(&local, &remote);
        let ids: Vec<&str> = merged.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(report.added_works, 1);
    }

    #[test]
    fn test_later_remote_wins() {
        let now = Utc::now();
        let mut l = work("a", "local");
        l.date_updated = Some(now);
        let mut r = work("a", "remote");
        r.date_updated = Some(now + Duration::seconds(1));

        let (merged, report) = merge_works(&[l], &[r]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "remote");
        assert_eq!(report.replaced_works, 1);
    }

    #[test]
    fn test_earlier_equal_or_missing_remote_keeps_local() {
        let now = Utc::now();
        let mut l = work("a", "local");
        l.date_updated = Some(now);

        for remote_ts in [Some(now - Duration::seconds(1)), Some(now), None] {
            let mut r = work("a", "remote");
            r.date_updated = remote_ts;
            let (merged, report) = merge_works(std::slice::from_ref(&l), &[r]);
            assert_eq!(merged[0].title, "local");
            assert_eq!(report.kept_local, 1);
        }

        // local without a timestamp is never replaced either
        let l = work("a", "local");
        let mut r = work("a", "remote");
        r.date_updated = Some(now);
        let (merged, _) = merge_works(&[l], &[r]);
        assert_eq!(merged[0].title, "local");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut a = work("a", "A");
        a.date_updated = Some(Utc::now());
        let records = RecordSet::new(vec![a, work("b", "B")], vec![Tag::new(1, "x")]);
        let (merged, report) = merge_records(&records, &records);
        assert_eq!(merged, records);
        assert_eq!(report.added_works + report.replaced_works + report.added_tags, 0);
        assert_eq!(report.kept_local, 2);
    }

    #[test]
    fn test_duplicate_remote_ids_do_not_duplicate() {
        let now = Utc::now();
        let mut first = work("n", "first");
        first.date_updated = Some(now);
        let mut second = work("n", "second");
        second.date_updated = Some(now + Duration::seconds(5));

        let (merged, report) = merge_works(&[], &[first, second]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "second");
        assert_eq!(report.added_works, 1);
        assert_eq!(report.replaced_works, 1);
    }

    #[test]
    fn test_tags_union_keeps_local() {
        let local = vec![Tag::new(1, "local-name")];
        let remote = vec![Tag::new(1, "remote-name"), Tag::new(2, "new")];
        let (merged, added) = merge_tags(&local, &remote);
        assert_eq!(added, 1);
        assert_eq!(merged[0].name, "local-name");
        assert_eq!(merged[1].name, "new");
    }
}

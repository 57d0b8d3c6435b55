use chrono::{DateTime, Utc};
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};
use weft_common::Label;

use crate::dataplane::DataPlane;
use crate::error::DataError;

/// Labels for every subject in a request, fetched once.
///
/// Tracks which subjects were asked for, not only which have labels, so a
/// later supplementary fetch can skip subjects already known to be clean.
/// Merging produces a new set; a built set is never mutated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelSet {
    labels: HashMap<SmolStr, Vec<Label>>,
    fetched: HashSet<SmolStr>,
}

impl LabelSet {
    /// Fetch labels for `subjects` in one call. No call is made when
    /// `subjects` is empty.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn fetch<D: DataPlane>(
        data: &D,
        subjects: impl IntoIterator<Item = SmolStr>,
    ) -> Result<Self, DataError> {
        let fetched: HashSet<SmolStr> = subjects.into_iter().collect();
        if fetched.is_empty() {
            return Ok(Self::default());
        }
        let mut ids: Vec<SmolStr> = fetched.iter().cloned().collect();
        ids.sort();

        #[cfg(feature = "tracing")]
        tracing::debug!(count = ids.len(), "fetching labels");

        let raw = data.labels(&ids).await?;
        Ok(Self::from_raw(raw, fetched, Utc::now()))
    }

    /// Build from already-fetched labels, settling expiry and negation as
    /// of `now`.
    pub fn from_raw(
        raw: HashMap<SmolStr, Vec<Label>>,
        fetched: HashSet<SmolStr>,
        now: DateTime<Utc>,
    ) -> Self {
        let labels = raw
            .into_iter()
            .filter(|(subject, _)| fetched.contains(subject))
            .map(|(subject, labels)| (subject, settle(labels, now)))
            .filter(|(_, labels)| !labels.is_empty())
            .collect();
        Self { labels, fetched }
    }

    /// Labels for `subject`, empty when it has none or was never fetched
    pub fn get(&self, subject: &str) -> &[Label] {
        self.labels.get(subject).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `subject` was part of a fetch
    pub fn covers(&self, subject: &str) -> bool {
        self.fetched.contains(subject)
    }

    /// Subjects from `candidates` this set has not fetched, deduplicated
    pub fn missing<I>(&self, candidates: I) -> Vec<SmolStr>
    where
        I: IntoIterator<Item = SmolStr>,
    {
        let mut out: Vec<SmolStr> = candidates
            .into_iter()
            .filter(|s| !self.covers(s))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        out.sort();
        out
    }

    /// A new set holding both. Entries in `self` win for subjects present
    /// in both.
    pub fn merged(&self, other: &LabelSet) -> LabelSet {
        let mut labels = other.labels.clone();
        labels.extend(self.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        let fetched = self.fetched.union(&other.fetched).cloned().collect();
        LabelSet { labels, fetched }
    }

    /// Number of subjects with at least one label
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

// Labels are applied in creation order. Expired labels are skipped, and a
// negation removes earlier labels with the same value from the same source.
fn settle(mut labels: Vec<Label>, now: DateTime<Utc>) -> Vec<Label> {
    labels.sort_by_key(|l| l.cts);
    let mut out: Vec<Label> = Vec::with_capacity(labels.len());
    for label in labels {
        if label.is_expired(now) {
            continue;
        }
        if label.neg {
            out.retain(|l| !(l.val == label.val && l.src == label.src));
            continue;
        }
        out.push(label);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::MemoryDataPlane;
    use chrono::Duration;
    use weft_common::Did;

    fn label(subject: &str, val: &str, cts: DateTime<Utc>) -> Label {
        Label {
            src: Did::new("did:plc:labeler").unwrap(),
            uri: subject.into(),
            cid: None,
            val: val.into(),
            neg: false,
            cts,
            exp: None,
        }
    }

    #[tokio::test]
    async fn empty_subjects_make_no_call() {
        let data = MemoryDataPlane::new();
        let set = LabelSet::fetch(&data, Vec::new()).await.unwrap();
        assert!(set.is_empty());
        assert_eq!(data.call_count("labels"), 0);
    }

    #[tokio::test]
    async fn tracks_clean_subjects() {
        let data = MemoryDataPlane::new();
        data.insert_label(label("did:plc:a", "spam", Utc::now()));
        let set = LabelSet::fetch(&data, ["did:plc:a".into(), "did:plc:b".into()])
            .await
            .unwrap();
        assert_eq!(set.get("did:plc:a").len(), 1);
        assert!(set.get("did:plc:b").is_empty());
        assert!(set.covers("did:plc:b"));
        assert_eq!(
            set.missing(["did:plc:b".into(), "did:plc:c".into(), "did:plc:c".into()]),
            vec![SmolStr::new_static("did:plc:c")]
        );
        assert_eq!(data.calls()[0].batch, 2);
    }

    #[test]
    fn negation_and_expiry() {
        let now = Utc::now();
        let mut expired = label("did:plc:a", "old", now - Duration::hours(2));
        expired.exp = Some(now - Duration::hours(1));
        let applied = label("did:plc:a", "porn", now - Duration::minutes(10));
        let mut negated = label("did:plc:a", "porn", now - Duration::minutes(5));
        negated.neg = true;
        let kept = label("did:plc:a", "rude", now - Duration::minutes(1));

        let raw = HashMap::from([(
            SmolStr::new_static("did:plc:a"),
            vec![kept, negated, expired, applied],
        )]);
        let set = LabelSet::from_raw(raw, HashSet::from(["did:plc:a".into()]), now);
        let vals: Vec<_> = set.get("did:plc:a").iter().map(|l| l.val.as_str()).collect();
        assert_eq!(vals, vec!["rude"]);
    }

    #[test]
    fn merge_is_non_destructive() {
        let now = Utc::now();
        let a = LabelSet::from_raw(
            HashMap::from([("did:plc:a".into(), vec![label("did:plc:a", "x", now)])]),
            HashSet::from(["did:plc:a".into()]),
            now,
        );
        let b = LabelSet::from_raw(
            HashMap::from([("did:plc:b".into(), vec![label("did:plc:b", "y", now)])]),
            HashSet::from(["did:plc:b".into(), "did:plc:c".into()]),
            now,
        );
        let merged = a.merged(&b);
        assert_eq!(merged.len(), 2);
        assert!(merged.covers("did:plc:c"));
        assert_eq!(a.len(), 1);
        assert!(!a.covers("did:plc:b"));
    }
}

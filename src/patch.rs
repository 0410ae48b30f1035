//! Incremental results as a stream of JSON patch operations.
//!
//! Requests do not return a finished value; they return an ordered sequence
//! of `add` patches that the consumer applies to an initially absent
//! document. Two invariants hold for every stream:
//!
//! 1. The first patch establishes the top-level container shape (an empty
//!    array, or an object with empty collections), so an aborted stream
//!    still reconstructs to a structurally valid partial result.
//! 2. For ranked streams, the array stays sorted by descending score after
//!    every patch: new matches are inserted at their rank, not appended.
//!
//! An error is terminal: the stream yields it once and then ends, and all
//! patches emitted before it remain valid.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::{FxHashSet, FxHasher};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The patch operation kind. Result streams only ever add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchOpKind {
    #[serde(rename = "add")]
    Add,
}

/// A single step of the incremental result protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: PatchOpKind,
    /// Slash-delimited pointer into the result document. `""` replaces the
    /// whole document, a trailing `/-` appends to an array.
    pub path: String,
    pub value: Value,
}

impl PatchOp {
    /// Patch that establishes (or replaces) the whole result document.
    pub fn root(value: Value) -> Self {
        PatchOp {
            op: PatchOpKind::Add,
            path: String::new(),
            value,
        }
    }

    /// Patch that appends to the top-level result array.
    pub fn append(value: Value) -> Self {
        PatchOp {
            op: PatchOpKind::Add,
            path: "/-".to_string(),
            value,
        }
    }

    /// Patch that adds at an explicit pointer path.
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        PatchOp {
            op: PatchOpKind::Add,
            path: path.into(),
            value,
        }
    }
}

/// Escape a string for use as a single JSON pointer token (RFC 6901).
pub fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn unescape_pointer_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Serialize a value into a patch payload. These payload types cannot fail
/// to serialize; a failure degrades to `null` rather than panicking.
pub fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Structural content hash of a JSON value, used for match deduplication.
///
/// Hashes the canonical serialization, so two values describing the same
/// symbol through different boundaries collapse to the same key.
pub fn structural_hash(value: &Value) -> u64 {
    let canonical = serde_json::to_string(value).unwrap_or_default();
    let mut hasher = FxHasher::default();
    canonical.hash(&mut hasher);
    hasher.finish()
}

/// An ordered, lazily produced sequence of patch operations.
///
/// Dropping the stream early is the (advisory) cancellation mechanism; no
/// in-flight engine call is preempted. After yielding an `Err` the stream
/// is exhausted.
pub struct PatchStream {
    inner: Box<dyn Iterator<Item = Result<PatchOp>>>,
    failed: bool,
}

impl PatchStream {
    /// Wrap an arbitrary patch iterator.
    pub fn new(inner: impl Iterator<Item = Result<PatchOp>> + 'static) -> Self {
        PatchStream {
            inner: Box::new(inner),
            failed: false,
        }
    }

    /// A stream that fails immediately without emitting any patch.
    pub fn fail(error: Error) -> Self {
        PatchStream::new(std::iter::once(Err(error)))
    }

    /// A stream of exactly one patch replacing the whole document.
    pub fn single(value: Value) -> Self {
        PatchStream::new(std::iter::once(Ok(PatchOp::root(value))))
    }

    /// A stream that establishes an empty array and then appends each value
    /// in production order.
    pub fn appending(values: impl Iterator<Item = Result<Value>> + 'static) -> Self {
        let first = std::iter::once(Ok(PatchOp::root(Value::Array(Vec::new()))));
        let rest = values.map(|value| value.map(PatchOp::append));
        PatchStream::new(first.chain(rest))
    }

    /// Replay a previously recorded patch sequence verbatim.
    pub fn replay(patches: Arc<Vec<PatchOp>>) -> Self {
        let mut index = 0;
        PatchStream::new(std::iter::from_fn(move || {
            let patch = patches.get(index)?.clone();
            index += 1;
            Some(Ok(patch))
        }))
    }

    /// Drain the stream into a patch list, stopping at the first error.
    pub fn collect_patches(self) -> Result<Vec<PatchOp>> {
        let mut patches = Vec::new();
        for item in self {
            patches.push(item?);
        }
        Ok(patches)
    }

    /// Drain the stream and apply every patch, returning the reconstructed
    /// result document (`None` for a stream that emitted nothing).
    pub fn build(self) -> Result<Option<Value>> {
        let mut doc = None;
        for item in self {
            apply_patch(&mut doc, &item?)?;
        }
        Ok(doc)
    }
}

impl Iterator for PatchStream {
    type Item = Result<PatchOp>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.inner.next()?;
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

/// Iterator that runs a thunk on first demand and then drains the iterator
/// it produced. Keeps expensive setup (file fetching, engine queries) off
/// the request path until the consumer actually pulls.
pub struct Defer<I, F> {
    thunk: Option<F>,
    iter: Option<I>,
}

/// Defer iterator construction until the first element is requested.
pub fn defer<I, F>(thunk: F) -> Defer<I, F>
where
    I: Iterator,
    F: FnOnce() -> I,
{
    Defer {
        thunk: Some(thunk),
        iter: None,
    }
}

impl<I, F> Iterator for Defer<I, F>
where
    I: Iterator,
    F: FnOnce() -> I,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if self.iter.is_none() {
            let thunk = self.thunk.take()?;
            self.iter = Some(thunk());
        }
        self.iter.as_mut().and_then(Iterator::next)
    }
}

/// Turns a stream of scored matches into rank-ordered patches.
///
/// Maintains the scores of everything emitted so far, sorted descending.
/// Each new match is inserted before the first strictly smaller score, so
/// the client-visible array is sorted by descending score after every
/// patch. Matches are deduplicated by structural hash before they count
/// against the result cap.
pub struct RankedPatches<I> {
    matches: I,
    scores: Vec<f64>,
    seen: FxHashSet<u64>,
    emitted: usize,
    cap: usize,
    started: bool,
    done: bool,
}

impl<I> RankedPatches<I>
where
    I: Iterator<Item = Result<(f64, Value)>>,
{
    pub fn new(matches: I, cap: usize) -> Self {
        RankedPatches {
            matches,
            scores: Vec::new(),
            seen: FxHashSet::default(),
            emitted: 0,
            cap,
            started: false,
            done: false,
        }
    }
}

impl<I> Iterator for RankedPatches<I>
where
    I: Iterator<Item = Result<(f64, Value)>>,
{
    type Item = Result<PatchOp>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(Ok(PatchOp::root(Value::Array(Vec::new()))));
        }
        loop {
            let item = match self.matches.next() {
                Some(item) => item,
                None => {
                    self.done = true;
                    return None;
                }
            };
            let (score, value) = match item {
                Ok(scored) => scored,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            if !self.seen.insert(structural_hash(&value)) {
                continue;
            }
            if self.emitted >= self.cap {
                self.done = true;
                return None;
            }
            self.emitted += 1;
            // Insert before the first strictly smaller score so equal scores
            // keep their production order.
            return Some(Ok(match self.scores.iter().position(|s| *s < score) {
                None => {
                    self.scores.push(score);
                    PatchOp::append(value)
                }
                Some(index) => {
                    self.scores.insert(index, score);
                    PatchOp::add(format!("/{index}"), value)
                }
            }));
        }
    }
}

/// Apply a single patch to a (possibly absent) result document.
pub fn apply_patch(doc: &mut Option<Value>, patch: &PatchOp) -> Result<()> {
    if patch.path.is_empty() {
        *doc = Some(patch.value.clone());
        return Ok(());
    }
    let root = doc
        .as_mut()
        .ok_or_else(|| Error::precondition(format!("patch {} into absent document", patch.path)))?;
    let tokens: Vec<String> = patch
        .path
        .split('/')
        .skip(1)
        .map(unescape_pointer_token)
        .collect();
    let Some((last, parents)) = tokens.split_last() else {
        return Err(Error::precondition(format!("empty patch path {}", patch.path)));
    };
    let mut target = root;
    for token in parents {
        target = match target {
            Value::Object(map) => map
                .get_mut(token.as_str())
                .ok_or_else(|| Error::precondition(format!("unknown member {token}")))?,
            Value::Array(items) => {
                let index: usize = token
                    .parse()
                    .map_err(|_| Error::precondition(format!("bad array index {token}")))?;
                items
                    .get_mut(index)
                    .ok_or_else(|| Error::precondition(format!("array index {index} out of range")))?
            }
            _ => return Err(Error::precondition(format!("cannot descend into {token}"))),
        };
    }
    match target {
        Value::Array(items) => {
            if last == "-" {
                items.push(patch.value.clone());
            } else {
                let index: usize = last
                    .parse()
                    .map_err(|_| Error::precondition(format!("bad array index {last}")))?;
                if index > items.len() {
                    return Err(Error::precondition(format!(
                        "array index {index} out of range"
                    )));
                }
                items.insert(index, patch.value.clone());
            }
        }
        Value::Object(map) => {
            map.insert(last.clone(), patch.value.clone());
        }
        _ => return Err(Error::precondition(format!("cannot add at {}", patch.path))),
    }
    Ok(())
}

/// Apply a patch sequence in order, returning the reconstructed document.
pub fn apply_patches<'a>(patches: impl IntoIterator<Item = &'a PatchOp>) -> Result<Option<Value>> {
    let mut doc = None;
    for patch in patches {
        apply_patch(&mut doc, patch)?;
    }
    Ok(doc)
}

#[cfg(test)]
mod patch_tests {
    use super::*;
    use serde_json::json;

    fn sorted_desc(values: &[Value], scores: &[(f64, Value)]) -> bool {
        // Map emitted values back to their scores and check descending order
        let mut last = f64::INFINITY;
        for value in values {
            let score = scores
                .iter()
                .find(|(_, v)| v == value)
                .map(|(s, _)| *s)
                .expect("emitted value came from the input");
            if score > last {
                return false;
            }
            last = score;
        }
        true
    }

    #[test]
    fn test_ranked_emission_stays_sorted_after_every_prefix() {
        let scored = vec![
            (1.0, json!("a")),
            (3.0, json!("b")),
            (2.0, json!("c")),
            (5.0, json!("d")),
            (2.0, json!("e")),
        ];
        let stream = RankedPatches::new(scored.clone().into_iter().map(Ok), 1000);
        let patches: Vec<PatchOp> = stream.map(|p| p.unwrap()).collect();

        // First patch establishes the empty array shape
        assert_eq!(patches[0], PatchOp::root(json!([])));

        for prefix_len in 1..=patches.len() {
            let doc = apply_patches(patches[..prefix_len].iter())
                .unwrap()
                .expect("document exists after the shape patch");
            let items = doc.as_array().expect("document is an array");
            assert!(
                sorted_desc(items, &scored),
                "prefix of {} patches is not rank-ordered: {:?}",
                prefix_len,
                items
            );
        }
    }

    #[test]
    fn test_ranked_emission_deduplicates_before_capping() {
        let scored = vec![
            (1.0, json!({"name": "x"})),
            (1.0, json!({"name": "x"})),
            (1.0, json!({"name": "y"})),
        ];
        let stream = RankedPatches::new(scored.into_iter().map(Ok), 2);
        let doc = PatchStream::new(stream).build().unwrap().unwrap();
        assert_eq!(doc.as_array().unwrap().len(), 2, "duplicate must not consume the cap");
    }

    #[test]
    fn test_ranked_emission_caps_results() {
        let scored = (0..50).map(|i| Ok((i as f64, json!(i))));
        let stream = RankedPatches::new(scored, 10);
        let doc = PatchStream::new(stream).build().unwrap().unwrap();
        assert_eq!(doc.as_array().unwrap().len(), 10);
    }

    #[test]
    fn test_error_is_terminal_but_keeps_prior_patches() {
        let items = vec![
            Ok((2.0, json!("kept"))),
            Err(crate::Error::precondition("boom")),
            Ok((1.0, json!("never"))),
        ];
        let mut stream = PatchStream::new(RankedPatches::new(items.into_iter(), 100));

        let mut doc = None;
        let mut saw_error = false;
        for item in stream.by_ref() {
            match item {
                Ok(patch) => apply_patch(&mut doc, &patch).unwrap(),
                Err(_) => saw_error = true,
            }
        }
        assert!(saw_error, "error must surface");
        assert!(stream.next().is_none(), "stream ends after the error");
        assert_eq!(doc.unwrap(), json!(["kept"]), "prior patches remain valid");
    }

    #[test]
    fn test_object_patches_for_edit_maps() {
        let uri = "file:///a/b.ts";
        let patches = vec![
            PatchOp::root(json!({"changes": {}})),
            PatchOp::add(
                format!("/changes/{}", escape_pointer_token(uri)),
                json!([{"newText": "x"}]),
            ),
            PatchOp::add(
                format!("/changes/{}/-", escape_pointer_token(uri)),
                json!({"newText": "y"}),
            ),
        ];
        let doc = apply_patches(patches.iter()).unwrap().unwrap();
        assert_eq!(
            doc,
            json!({"changes": {"file:///a/b.ts": [{"newText": "x"}, {"newText": "y"}]}})
        );
    }

    #[test]
    fn test_pointer_token_escaping_round_trip() {
        let token = "a/~b/c";
        assert_eq!(unescape_pointer_token(&escape_pointer_token(token)), token);
        assert_eq!(escape_pointer_token("~/"), "~0~1");
    }

    #[test]
    fn test_defer_runs_thunk_lazily() {
        let mut ran = false;
        {
            let _iter = defer(|| {
                ran = true;
                std::iter::once(1)
            });
            // Not pulled: thunk must not run
        }
        assert!(!ran, "thunk ran without demand");

        let collected: Vec<i32> = defer(|| vec![1, 2].into_iter()).collect();
        assert_eq!(collected, vec![1, 2]);
    }

    #[test]
    fn test_replay_is_identical() {
        let patches = Arc::new(vec![PatchOp::root(json!([])), PatchOp::append(json!(1))]);
        let a: Vec<PatchOp> = PatchStream::replay(patches.clone())
            .map(|p| p.unwrap())
            .collect();
        let b: Vec<PatchOp> = PatchStream::replay(patches.clone())
            .map(|p| p.unwrap())
            .collect();
        assert_eq!(a, b);
        assert_eq!(a, *patches);
    }
}

//! Payload offload codec.
//!
//! Rewrites JSON request/response documents so large inline images travel
//! as object-storage references instead of base64 text, and back again.
//!
//! - [`OffloadCodec::inbound`]: string leaves ending in an image suffix are
//!   replaced by the base64 content stored at that path; string leaves
//!   longer than [`BASE64_MIN_LEN`] are base64-decoded, uploaded to
//!   `images/{user}/{task_id}_{seq}.png` and replaced by that path.
//! - [`OffloadCodec::outbound`]: image-suffixed string leaves are replaced
//!   by their stored base64 content. Never uploads.
//!
//! Both directions keep the document shape and only ever touch string
//! leaves. A storage failure leaves that one field as it was; the
//! traversal always completes.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::storage::ObjectStore;

/// Strings longer than this (in bytes) are treated as inline encoded images.
pub const BASE64_MIN_LEN: usize = 2048;

const IMAGE_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg"];

pub fn is_image_path(value: &str) -> bool {
    IMAGE_SUFFIXES.iter().any(|suffix| value.ends_with(suffix))
}

/// Storage key for the `seq`-th offloaded field of a task's document.
pub fn offload_path(user: &str, task_id: &str, seq: usize) -> String {
    format!("images/{user}/{task_id}_{seq}.png")
}

/// Per-invocation traversal state.
struct Pass {
    /// Present only for inbound traversals, which may upload.
    target: Option<OffloadTarget>,
    /// Sequence number of the next offloaded field. Starts at 1.
    next_seq: usize,
    fetched: usize,
    skipped: usize,
}

struct OffloadTarget {
    task_id: String,
    user: String,
}

impl Pass {
    fn inbound(task_id: &str, user: &str) -> Self {
        Self {
            target: Some(OffloadTarget {
                task_id: task_id.to_string(),
                user: user.to_string(),
            }),
            next_seq: 1,
            fetched: 0,
            skipped: 0,
        }
    }

    fn outbound() -> Self {
        Self {
            target: None,
            next_seq: 1,
            fetched: 0,
            skipped: 0,
        }
    }

    fn offloaded(&self) -> usize {
        self.next_seq - 1
    }
}

#[derive(Clone)]
pub struct OffloadCodec {
    store: Arc<dyn ObjectStore>,
}

impl OffloadCodec {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Offload large inline strings and inline stored images for `task_id`.
    pub async fn inbound(&self, mut document: Value, task_id: &str, user: &str) -> Value {
        let mut pass = Pass::inbound(task_id, user);
        self.visit(&mut document, &mut pass).await;
        tracing::debug!(
            task_id,
            offloaded = pass.offloaded(),
            fetched = pass.fetched,
            skipped = pass.skipped,
            "Inbound offload pass complete",
        );
        document
    }

    /// Inline every stored image reference in `document`.
    pub async fn outbound(&self, mut document: Value) -> Value {
        let mut pass = Pass::outbound();
        self.visit(&mut document, &mut pass).await;
        tracing::debug!(
            fetched = pass.fetched,
            skipped = pass.skipped,
            "Outbound offload pass complete",
        );
        document
    }

    /// [`inbound`](Self::inbound) over a raw JSON body.
    ///
    /// Bodies that are not a JSON object or array are returned unchanged.
    pub async fn inbound_bytes(&self, body: &[u8], task_id: &str, user: &str) -> Vec<u8> {
        match parse_container(body) {
            Some(document) => encode_or(self.inbound(document, task_id, user).await, body),
            None => body.to_vec(),
        }
    }

    /// [`outbound`](Self::outbound) over a raw JSON body.
    pub async fn outbound_bytes(&self, body: &[u8]) -> Vec<u8> {
        match parse_container(body) {
            Some(document) => encode_or(self.outbound(document).await, body),
            None => body.to_vec(),
        }
    }

    fn visit<'a>(&'a self, value: &'a mut Value, pass: &'a mut Pass) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            match value {
                Value::Object(map) => {
                    for (_, child) in map.iter_mut() {
                        self.visit(child, &mut *pass).await;
                    }
                }
                Value::Array(items) => {
                    for child in items.iter_mut() {
                        self.visit(child, &mut *pass).await;
                    }
                }
                Value::String(text) => {
                    if let Some(replacement) = self.rewrite_string(text, pass).await {
                        *text = replacement;
                    }
                }
                Value::Null | Value::Bool(_) | Value::Number(_) => {}
            }
        })
    }

    /// Return the replacement for a string leaf, or `None` to keep it.
    async fn rewrite_string(&self, text: &str, pass: &mut Pass) -> Option<String> {
        if is_image_path(text) {
            return match self.store.download_base64(text).await {
                Ok(encoded) => {
                    pass.fetched += 1;
                    Some(encoded)
                }
                Err(e) => {
                    pass.skipped += 1;
                    tracing::warn!(path = %text, error = %e, "Image fetch failed, keeping reference");
                    None
                }
            };
        }

        let target = pass.target.as_ref()?;
        if text.len() <= BASE64_MIN_LEN {
            return None;
        }

        let path = offload_path(&target.user, &target.task_id, pass.next_seq);
        let bytes = match STANDARD.decode(text) {
            Ok(bytes) => bytes,
            Err(e) => {
                pass.skipped += 1;
                tracing::warn!(path = %path, error = %e, "Inline content is not base64, keeping it");
                return None;
            }
        };

        match self.store.upload_bytes(&path, bytes).await {
            Ok(()) => {
                pass.next_seq += 1;
                Some(path)
            }
            Err(e) => {
                pass.skipped += 1;
                tracing::warn!(path = %path, error = %e, "Offload upload failed, keeping inline content");
                None
            }
        }
    }
}

fn parse_container(body: &[u8]) -> Option<Value> {
    match serde_json::from_slice::<Value>(body) {
        Ok(document @ (Value::Object(_) | Value::Array(_))) => Some(document),
        _ => None,
    }
}

fn encode_or(document: Value, original: &[u8]) -> Vec<u8> {
    serde_json::to_vec(&document).unwrap_or_else(|_| original.to_vec())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::storage::StorageError;

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<HashMap<String, Vec<u8>>>,
        uploads: Mutex<Vec<String>>,
        fail_uploads: bool,
    }

    impl MemoryStore {
        fn failing_uploads() -> Self {
            Self {
                fail_uploads: true,
                ..Self::default()
            }
        }

        fn insert(&self, path: &str, bytes: &[u8]) {
            self.objects
                .lock()
                .unwrap()
                .insert(path.to_string(), bytes.to_vec());
        }

        fn uploads(&self) -> Vec<String> {
            self.uploads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn upload_bytes(&self, path: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
            if self.fail_uploads {
                return Err(StorageError::Backend("bucket unreachable".into()));
            }
            self.uploads.lock().unwrap().push(path.to_string());
            self.insert(path, &bytes);
            Ok(())
        }

        async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
            self.objects
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(path.to_string()))
        }
    }

    /// Valid standard base64 of exactly 5000 characters.
    fn large_base64() -> (String, Vec<u8>) {
        let bytes: Vec<u8> = (0..3750u32).map(|i| (i % 251) as u8).collect();
        let encoded = STANDARD.encode(&bytes);
        assert_eq!(encoded.len(), 5000);
        (encoded, bytes)
    }

    fn codec(store: &Arc<MemoryStore>) -> OffloadCodec {
        OffloadCodec::new(Arc::clone(store) as Arc<dyn ObjectStore>)
    }

    #[test]
    fn image_suffixes() {
        assert!(is_image_path("images/a/b_1.png"));
        assert!(is_image_path("photo.jpg"));
        assert!(is_image_path("photo.jpeg"));
        assert!(!is_image_path("photo.webp"));
        assert!(!is_image_path("png"));
    }

    #[test]
    fn offload_path_format() {
        assert_eq!(offload_path("alice", "abcdefghij", 1), "images/alice/abcdefghij_1.png");
    }

    #[tokio::test]
    async fn small_plain_documents_pass_through_both_directions() {
        let store = Arc::new(MemoryStore::default());
        let codec = codec(&store);
        let doc = json!({
            "batch_size": 1,
            "cfg_scale": 7.5,
            "enable_hr": false,
            "nested": { "list": ["a", 2, null, { "deep": "value" }] },
            "prompt": "a castle on a hill",
            "seed": null,
        });

        assert_eq!(codec.inbound(doc.clone(), "task000001", "alice").await, doc);
        assert_eq!(codec.outbound(doc.clone()).await, doc);
        assert!(store.uploads().is_empty());
    }

    #[tokio::test]
    async fn large_inline_string_is_uploaded_once() {
        let store = Arc::new(MemoryStore::default());
        let codec = codec(&store);
        let (encoded, bytes) = large_base64();
        let doc = json!({ "init_images": [encoded], "prompt": "cat" });

        let out = codec.inbound(doc, "task000001", "alice").await;

        assert_eq!(out["init_images"][0], "images/alice/task000001_1.png");
        assert_eq!(out["prompt"], "cat");
        assert_eq!(store.uploads(), vec!["images/alice/task000001_1.png"]);
        assert_eq!(
            store.download("images/alice/task000001_1.png").await.unwrap(),
            bytes
        );
    }

    #[tokio::test]
    async fn sequence_increments_across_nested_containers() {
        let store = Arc::new(MemoryStore::default());
        let codec = codec(&store);
        let (encoded, _) = large_base64();
        let doc = json!([
            { "a": encoded.clone() },
            [[encoded.clone()], "short"],
        ]);

        let out = codec.inbound(doc, "t1", "bob").await;

        assert_eq!(out[0]["a"], "images/bob/t1_1.png");
        assert_eq!(out[1][0][0], "images/bob/t1_2.png");
        assert_eq!(out[1][1], "short");
        assert_eq!(store.uploads().len(), 2);
    }

    #[tokio::test]
    async fn string_at_threshold_is_not_offloaded() {
        let store = Arc::new(MemoryStore::default());
        let codec = codec(&store);
        let exact = "A".repeat(BASE64_MIN_LEN);
        let doc = json!({ "mask": exact });

        assert_eq!(codec.inbound(doc.clone(), "t1", "bob").await, doc);
        assert!(store.uploads().is_empty());
    }

    #[tokio::test]
    async fn stored_image_reference_is_inlined() {
        let store = Arc::new(MemoryStore::default());
        store.insert("inputs/cat.png", b"\x89PNG fake");
        let codec = codec(&store);

        let doc = json!({ "init_images": ["inputs/cat.png"] });
        let expected = STANDARD.encode(b"\x89PNG fake");

        let inbound = codec.inbound(doc.clone(), "t1", "bob").await;
        assert_eq!(inbound["init_images"][0], expected.as_str());

        let outbound = codec.outbound(doc).await;
        assert_eq!(outbound["init_images"][0], expected.as_str());
    }

    #[tokio::test]
    async fn missing_image_reference_is_left_unchanged() {
        let store = Arc::new(MemoryStore::default());
        let codec = codec(&store);
        let doc = json!({ "image": "inputs/missing.jpg", "prompt": "dog" });

        assert_eq!(codec.inbound(doc.clone(), "t1", "bob").await, doc);
        assert_eq!(codec.outbound(doc.clone()).await, doc);
    }

    #[tokio::test]
    async fn failed_upload_keeps_inline_content() {
        let store = Arc::new(MemoryStore::failing_uploads());
        let codec = codec(&store);
        let (encoded, _) = large_base64();
        let doc = json!({ "init_images": [encoded], "steps": 20 });

        assert_eq!(codec.inbound(doc.clone(), "t1", "bob").await, doc);
    }

    #[tokio::test]
    async fn undecodable_string_does_not_consume_a_sequence_number() {
        let store = Arc::new(MemoryStore::default());
        let codec = codec(&store);
        let (encoded, _) = large_base64();
        let garbage = "!".repeat(3000);
        let doc = json!({ "a": garbage.clone(), "b": encoded });

        let out = codec.inbound(doc, "t1", "bob").await;

        assert_eq!(out["a"], garbage.as_str());
        assert_eq!(out["b"], "images/bob/t1_1.png");
    }

    #[tokio::test]
    async fn outbound_never_uploads() {
        let store = Arc::new(MemoryStore::default());
        let codec = codec(&store);
        let (encoded, _) = large_base64();
        let doc = json!({ "images": [encoded] });

        assert_eq!(codec.outbound(doc.clone()).await, doc);
        assert!(store.uploads().is_empty());
    }

    #[tokio::test]
    async fn outbound_restores_inbound_offloads() {
        let store = Arc::new(MemoryStore::default());
        let codec = codec(&store);
        let (first, _) = large_base64();
        let second = STANDARD.encode(vec![7u8; 4000]);
        let doc = json!({
            "alwayson_scripts": { "controlnet": { "args": [{ "input_image": second }] } },
            "init_images": [first],
            "prompt": "round trip",
        });

        let offloaded = codec.inbound(doc.clone(), "t9", "carol").await;
        assert_ne!(offloaded, doc);

        assert_eq!(codec.outbound(offloaded).await, doc);
    }

    #[tokio::test]
    async fn byte_bodies_that_are_not_containers_are_untouched() {
        let store = Arc::new(MemoryStore::default());
        let codec = codec(&store);

        assert_eq!(codec.inbound_bytes(b"not json", "t1", "bob").await, b"not json");
        assert_eq!(codec.outbound_bytes(b"\"a.png\"").await, b"\"a.png\"");
    }

    #[tokio::test]
    async fn byte_bodies_are_rewritten() {
        let store = Arc::new(MemoryStore::default());
        let codec = codec(&store);
        let (encoded, _) = large_base64();
        let body = serde_json::to_vec(&json!([encoded])).unwrap();

        let out = codec.inbound_bytes(&body, "t1", "bob").await;
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, json!(["images/bob/t1_1.png"]));
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::errors::AdminError;
use crate::s3utils;
use crate::storage::HealEngine;
use crate::utils::{self, DateTime, DateTimeExt, Duration};

// Largest number of unconsumed heal result records buffered per
// sequence. The repair engine waits once the client falls this far
// behind in polling.
pub const UNCONSUMED_HEAL_RESULT_ITEMS_CAP: usize = 1024;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealScanMode {
    Normal,
    Deep,
}

impl Default for HealScanMode {
    fn default() -> Self {
        HealScanMode::Normal
    }
}

// Heal settings supplied by the admin client at sequence start.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default)]
pub struct HealOpts {
    #[serde(default)]
    pub recursive: bool,
    #[serde(rename = "dryRun", default)]
    pub dry_run: bool,
    #[serde(default)]
    pub remove: bool,
    #[serde(rename = "scanMode", default)]
    pub scan_mode: HealScanMode,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealItemType {
    Metadata,
    Bucket,
    Object,
}

// One record of the heal log, produced per item inspected or repaired.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealResultItem {
    // Assigned in consumption order when the record is popped.
    #[serde(rename = "resultId")]
    pub result_index: u64,
    #[serde(rename = "type")]
    pub item_type: HealItemType,
    pub bucket: String,
    pub object: String,
    #[serde(default)]
    pub detail: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealStatusSummary {
    Queued,
    Running,
    Finished,
    Failed,
}

// Target of a heal sequence, validated before any state mutation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HealPath {
    bucket: String,
    object_prefix: String,
}

impl HealPath {
    pub fn new(bucket: &str, object_prefix: &str) -> Result<HealPath, AdminError> {
        if bucket.is_empty() {
            // Bucket is required if an object prefix is given.
            if !object_prefix.is_empty() {
                return Err(AdminError::HealMissingBucket);
            }
        } else if s3utils::check_valid_bucket_name(bucket).is_err() {
            return Err(AdminError::InvalidBucketName);
        }
        if s3utils::check_valid_object_prefix(object_prefix).is_err() {
            return Err(AdminError::InvalidObjectPrefix);
        }
        Ok(HealPath {
            bucket: bucket.to_owned(),
            object_prefix: object_prefix.to_owned(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn object_prefix(&self) -> &str {
        &self.object_prefix
    }

    // Map key under which the sequence is registered.
    pub fn key(&self) -> String {
        format!("{}/{}", self.bucket, self.object_prefix)
    }
}

// Payload returned on a successful heal sequence start.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealStartSuccess {
    #[serde(rename = "clientToken")]
    pub client_token: String,
    #[serde(rename = "clientAddress")]
    pub client_address: String,
    #[serde(rename = "startTime")]
    pub start_time: DateTime,
}

// Aggregate status plus the next batch of consumed records, returned on
// every poll.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealSequenceStatus {
    pub summary: HealStatusSummary,
    #[serde(rename = "detail", default)]
    pub failure_detail: String,
    #[serde(rename = "startTime")]
    pub start_time: DateTime,
    pub settings: HealOpts,
    #[serde(rename = "numDisks")]
    pub num_disks: usize,
    #[serde(default)]
    pub items: Vec<HealResultItem>,
}

struct HealSequenceState {
    summary: HealStatusSummary,
    failure_detail: String,
    end_time: Option<DateTime>,
}

// One heal job over a bucket/prefix. Repair work runs detached; its
// record log is consumed destructively through token polling.
pub struct HealSequence {
    path: HealPath,
    client_token: String,
    client_address: String,
    force_started: bool,
    opts: HealOpts,
    start_time: DateTime,
    num_disks: usize,

    state: Mutex<HealSequenceState>,
    items_tx: Mutex<Option<mpsc::Sender<HealResultItem>>>,
    items_rx: Mutex<mpsc::Receiver<HealResultItem>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    consumed_items_count: AtomicU64,
}

impl HealSequence {
    pub fn new(
        bucket: &str,
        object_prefix: &str,
        client_address: String,
        num_disks: usize,
        opts: HealOpts,
        force_started: bool,
    ) -> Result<HealSequence, AdminError> {
        let path = HealPath::new(bucket, object_prefix)?;
        let (items_tx, items_rx) = mpsc::channel(UNCONSUMED_HEAL_RESULT_ITEMS_CAP);
        let (stop_tx, stop_rx) = watch::channel(false);
        Ok(HealSequence {
            path,
            client_token: Uuid::new_v4().to_string(),
            client_address,
            force_started,
            opts,
            start_time: utils::now(),
            num_disks,
            state: Mutex::new(HealSequenceState {
                summary: HealStatusSummary::Queued,
                failure_detail: String::new(),
                end_time: None,
            }),
            items_tx: Mutex::new(Some(items_tx)),
            items_rx: Mutex::new(items_rx),
            stop_tx,
            stop_rx,
            consumed_items_count: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &HealPath {
        &self.path
    }

    pub fn client_token(&self) -> &str {
        &self.client_token
    }

    pub fn force_started(&self) -> bool {
        self.force_started
    }

    pub fn consumed_items_count(&self) -> u64 {
        self.consumed_items_count.load(Ordering::SeqCst)
    }

    pub fn has_ended(&self) -> bool {
        let state = self.state.lock().unwrap();
        matches!(
            state.summary,
            HealStatusSummary::Finished | HealStatusSummary::Failed
        )
    }

    fn ended_at(&self) -> Option<DateTime> {
        self.state.lock().unwrap().end_time
    }

    // Aborts the sequence. In-flight repair work is abandoned, not
    // rolled back.
    fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    fn start_success(&self) -> HealStartSuccess {
        HealStartSuccess {
            client_token: self.client_token.clone(),
            client_address: self.client_address.clone(),
            start_time: self.start_time,
        }
    }

    // Background driver of the repair work. The launching request never
    // waits on this; progress is observed only through polling.
    async fn heal_sequence_start(self: Arc<HealSequence>, engine: Arc<dyn HealEngine>) {
        {
            let mut state = self.state.lock().unwrap();
            state.summary = HealStatusSummary::Running;
        }

        let items_tx = match self.items_tx.lock().unwrap().take() {
            Some(tx) => tx,
            // Driver already ran once for this sequence.
            None => return,
        };
        let mut stop_rx = self.stop_rx.clone();

        tokio::select! {
            res = engine.run_heal(&self.path, self.opts, items_tx) => {
                let mut state = self.state.lock().unwrap();
                state.end_time = Some(utils::now());
                match res {
                    Ok(()) => {
                        state.summary = HealStatusSummary::Finished;
                    }
                    Err(err) => {
                        log::error!(
                            "heal sequence on '{}' failed: {:#}",
                            self.path.key(),
                            err
                        );
                        state.summary = HealStatusSummary::Failed;
                        state.failure_detail = err.to_string();
                    }
                }
            }
            _ = stop_rx.changed() => {
                // Dropping the engine future closes the record channel.
                let mut state = self.state.lock().unwrap();
                state.end_time = Some(utils::now());
                state.summary = HealStatusSummary::Failed;
                state.failure_detail = "heal sequence aborted".to_owned();
            }
        }
    }

    // Removes and returns buffered records, oldest first, stamping each
    // with its consumption index. Records are delivered exactly once.
    fn pop_status(&self) -> HealSequenceStatus {
        let mut items = Vec::new();
        {
            let mut rx = self.items_rx.lock().unwrap();
            while items.len() < UNCONSUMED_HEAL_RESULT_ITEMS_CAP {
                match rx.try_recv() {
                    Ok(item) => items.push(item),
                    Err(_) => break,
                }
            }
        }

        let consumed_before = self
            .consumed_items_count
            .fetch_add(items.len() as u64, Ordering::SeqCst);
        for (i, item) in items.iter_mut().enumerate() {
            item.result_index = consumed_before + i as u64 + 1;
        }

        let state = self.state.lock().unwrap();
        HealSequenceStatus {
            summary: state.summary,
            failure_detail: state.failure_detail.clone(),
            start_time: self.start_time,
            settings: self.opts,
            num_disks: self.num_disks,
            items,
        }
    }
}

// Process-wide registry of heal sequences, keyed by target path. Owns
// every sequence; constructed once and handed to callers by reference.
pub struct HealStateStore {
    heal_seq_map: Mutex<HashMap<String, Arc<HealSequence>>>,
}

impl Default for HealStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HealStateStore {
    pub fn new() -> HealStateStore {
        HealStateStore {
            heal_seq_map: Mutex::new(HashMap::new()),
        }
    }

    // Registers and starts a new heal sequence. At most one sequence per
    // path may be running; force-start aborts and replaces it. The check
    // and the insert happen under one lock, two concurrent launches for
    // the same path cannot both win.
    pub fn launch_new_heal_sequence(
        &self,
        seq: HealSequence,
        engine: Arc<dyn HealEngine>,
    ) -> Result<HealStartSuccess, AdminError> {
        let seq = Arc::new(seq);
        let key = seq.path().key();
        {
            let mut map = self.heal_seq_map.lock().unwrap();
            if let Some(existing) = map.get(&key) {
                if !existing.has_ended() && !seq.force_started() {
                    return Err(AdminError::HealInProgress {
                        client_token: existing.client_token().to_owned(),
                        start_time: existing.start_time,
                    });
                }
                existing.stop();
            }
            map.insert(key, seq.clone());
        }

        let resp = seq.start_success();
        tokio::spawn(HealSequence::heal_sequence_start(seq, engine));
        Ok(resp)
    }

    // Destructive status poll. The token must match the sequence
    // currently registered for the path; a token from a superseded
    // sequence no longer resolves.
    pub fn pop_heal_status(
        &self,
        path: &HealPath,
        client_token: &str,
    ) -> Result<HealSequenceStatus, AdminError> {
        let seq = {
            let map = self.heal_seq_map.lock().unwrap();
            map.get(&path.key()).cloned()
        }
        .ok_or(AdminError::InvalidClientToken)?;

        if seq.client_token() != client_token {
            return Err(AdminError::InvalidClientToken);
        }
        Ok(seq.pop_status())
    }

    // Evicts terminal sequences whose end is older than `keep`. Running
    // sequences are never touched.
    pub fn stop_stale_heal_sequences(&self, keep: Duration) {
        let now = utils::now();
        let mut map = self.heal_seq_map.lock().unwrap();
        map.retain(|_, seq| match seq.ended_at() {
            Some(end_time) => now.duration_offset(end_time) <= keep,
            None => true,
        });
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    // Scripted repair engine: emits the given records, then finishes,
    // fails, or blocks forever.
    struct ScriptedEngine {
        items: Vec<HealResultItem>,
        fail_with: Option<String>,
        block: bool,
    }

    impl ScriptedEngine {
        fn finished(items: Vec<HealResultItem>) -> Arc<Self> {
            Arc::new(ScriptedEngine {
                items,
                fail_with: None,
                block: false,
            })
        }

        fn blocking() -> Arc<Self> {
            Arc::new(ScriptedEngine {
                items: Vec::new(),
                fail_with: None,
                block: true,
            })
        }

        fn failing(detail: &str) -> Arc<Self> {
            Arc::new(ScriptedEngine {
                items: Vec::new(),
                fail_with: Some(detail.to_owned()),
                block: false,
            })
        }
    }

    #[async_trait]
    impl HealEngine for ScriptedEngine {
        async fn run_heal(
            &self,
            _path: &HealPath,
            _opts: HealOpts,
            tx: mpsc::Sender<HealResultItem>,
        ) -> anyhow::Result<()> {
            for item in self.items.clone() {
                if tx.send(item).await.is_err() {
                    return Ok(());
                }
            }
            if self.block {
                std::future::pending::<()>().await;
            }
            if let Some(detail) = &self.fail_with {
                anyhow::bail!("{}", detail);
            }
            Ok(())
        }
    }

    fn object_item(object: &str) -> HealResultItem {
        HealResultItem {
            result_index: 0,
            item_type: HealItemType::Object,
            bucket: "my-bucket".to_owned(),
            object: object.to_owned(),
            detail: String::new(),
        }
    }

    fn new_seq(force: bool) -> HealSequence {
        HealSequence::new(
            "my-bucket",
            "photos/",
            "127.0.0.1:9000".to_owned(),
            4,
            HealOpts::default(),
            force,
        )
        .unwrap()
    }

    async fn wait_until_ended(store: &HealStateStore, path: &HealPath, token: &str) {
        for _ in 0..500 {
            let status = store.pop_heal_status(path, token).unwrap();
            if matches!(
                status.summary,
                HealStatusSummary::Finished | HealStatusSummary::Failed
            ) && status.items.is_empty()
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("heal sequence did not end in time");
    }

    #[test]
    fn test_heal_path_validation() {
        assert!(matches!(
            HealPath::new("", "photos/"),
            Err(AdminError::HealMissingBucket)
        ));
        assert!(matches!(
            HealPath::new("Bad..Name", ""),
            Err(AdminError::InvalidBucketName)
        ));
        assert!(matches!(
            HealPath::new("my-bucket", "a\\b"),
            Err(AdminError::InvalidObjectPrefix)
        ));

        let path = HealPath::new("my-bucket", "photos/").unwrap();
        assert_eq!(path.key(), "my-bucket/photos/");
        assert!(HealPath::new("", "").is_ok());
    }

    #[tokio::test]
    async fn test_second_launch_without_force_fails() {
        let store = HealStateStore::new();
        let engine = ScriptedEngine::blocking();

        let first = store
            .launch_new_heal_sequence(new_seq(false), engine.clone())
            .unwrap();

        match store.launch_new_heal_sequence(new_seq(false), engine) {
            Err(AdminError::HealInProgress {
                client_token,
                start_time,
            }) => {
                assert_eq!(client_token, first.client_token);
                assert_eq!(start_time, first.start_time);
            }
            other => panic!("expected HealInProgress, got {:?}", other.map(|r| r.client_token)),
        }
    }

    #[tokio::test]
    async fn test_force_start_supersedes_running_sequence() {
        let store = HealStateStore::new();
        let path = HealPath::new("my-bucket", "photos/").unwrap();

        let first = store
            .launch_new_heal_sequence(new_seq(false), ScriptedEngine::blocking())
            .unwrap();
        let second = store
            .launch_new_heal_sequence(new_seq(true), ScriptedEngine::blocking())
            .unwrap();
        assert_ne!(first.client_token, second.client_token);

        // The superseded token no longer resolves.
        assert!(matches!(
            store.pop_heal_status(&path, &first.client_token),
            Err(AdminError::InvalidClientToken)
        ));
        assert!(store.pop_heal_status(&path, &second.client_token).is_ok());
    }

    #[tokio::test]
    async fn test_pop_is_destructive_and_monotonic() {
        let store = HealStateStore::new();
        let path = HealPath::new("my-bucket", "photos/").unwrap();
        let engine = ScriptedEngine::finished(vec![
            object_item("photos/a.jpg"),
            object_item("photos/b.jpg"),
            object_item("photos/c.jpg"),
        ]);

        let started = store
            .launch_new_heal_sequence(new_seq(false), engine)
            .unwrap();

        let mut seen = Vec::new();
        let mut last_consumed = 0;
        for _ in 0..500 {
            let status = store
                .pop_heal_status(&path, &started.client_token)
                .unwrap();
            for item in &status.items {
                seen.push(item.clone());
            }
            let consumed = seen.len();
            assert!(consumed >= last_consumed);
            last_consumed = consumed;
            if status.summary == HealStatusSummary::Finished && status.items.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        // Each record was delivered exactly once, in order.
        assert_eq!(seen.len(), 3);
        for (i, item) in seen.iter().enumerate() {
            assert_eq!(item.result_index, i as u64 + 1);
        }

        // Terminal marker: repeated polls succeed with no items.
        let status = store
            .pop_heal_status(&path, &started.client_token)
            .unwrap();
        assert_eq!(status.summary, HealStatusSummary::Finished);
        assert!(status.items.is_empty());
    }

    #[tokio::test]
    async fn test_failed_engine_marks_sequence_failed() {
        let store = HealStateStore::new();
        let path = HealPath::new("my-bucket", "photos/").unwrap();

        let started = store
            .launch_new_heal_sequence(new_seq(false), ScriptedEngine::failing("disk gone"))
            .unwrap();
        wait_until_ended(&store, &path, &started.client_token).await;

        let status = store
            .pop_heal_status(&path, &started.client_token)
            .unwrap();
        assert_eq!(status.summary, HealStatusSummary::Failed);
        assert!(status.failure_detail.contains("disk gone"));
    }

    #[tokio::test]
    async fn test_relaunch_after_terminal_needs_no_force() {
        let store = HealStateStore::new();
        let path = HealPath::new("my-bucket", "photos/").unwrap();

        let first = store
            .launch_new_heal_sequence(new_seq(false), ScriptedEngine::finished(Vec::new()))
            .unwrap();
        wait_until_ended(&store, &path, &first.client_token).await;

        let second = store
            .launch_new_heal_sequence(new_seq(false), ScriptedEngine::blocking())
            .unwrap();
        assert_ne!(first.client_token, second.client_token);
    }

    #[tokio::test]
    async fn test_stale_sequences_are_reaped() {
        let store = HealStateStore::new();
        let path = HealPath::new("my-bucket", "photos/").unwrap();

        let started = store
            .launch_new_heal_sequence(new_seq(false), ScriptedEngine::finished(Vec::new()))
            .unwrap();
        wait_until_ended(&store, &path, &started.client_token).await;

        store.stop_stale_heal_sequences(Duration::from_secs(0));
        assert!(matches!(
            store.pop_heal_status(&path, &started.client_token),
            Err(AdminError::InvalidClientToken)
        ));

        // A running sequence survives the reaper.
        let running = store
            .launch_new_heal_sequence(new_seq(false), ScriptedEngine::blocking())
            .unwrap();
        store.stop_stale_heal_sequences(Duration::from_secs(0));
        assert!(store.pop_heal_status(&path, &running.client_token).is_ok());
    }
}

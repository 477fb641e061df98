use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use anyhow::Result;
use restyle_contracts::batch::{Batch, ItemOutcome, ItemStatus, BATCH_SIZE};
use restyle_contracts::catalog::{Catalog, DesignStyle, RoomType};
use restyle_contracts::events::{EventKind, EventPayload, EventWriter};
use restyle_contracts::notices::Notice;
use restyle_contracts::usage::{UsageLimiter, UsageStore};
use serde_json::{json, Value};

use crate::cancel::CancelToken;
use crate::error::{GenerationError, StartError};
use crate::export::{self, DEFAULT_FILE_PREFIX};
use crate::instruction::GenerationPayload;
use crate::prepare::{load_upload, UploadedImage};
use crate::provider::{FallbackGenerator, Generated, ImageGenerator};
use crate::text::error_chain_text;

const DEFAULT_CARD_ASPECT_RATIO: f64 = 16.0 / 9.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub generation: u64,
    pub succeeded: usize,
    pub failed: usize,
    /// Batches left after this one was recorded.
    pub remaining: u64,
    /// The batch was cancelled before it settled; nothing was kept or counted.
    pub cancelled: bool,
}

/// Progress published while a batch or a single regeneration runs.
#[derive(Debug, Clone, PartialEq)]
pub enum StudioUpdate {
    BatchStarted { generation: u64, labels: Vec<String> },
    ItemReopened { index: usize },
    ItemSettled {
        index: usize,
        status: ItemStatus,
        progress: f64,
    },
}

/// One redesign session: the uploaded photo, the room and style picks, the
/// current three-slot batch and the notices produced along the way.
///
/// All state is owned by the caller's thread. Generation calls run on scoped
/// workers and report back over a channel; only this struct writes the
/// batch and the usage counter.
pub struct Studio<G: ImageGenerator, S: UsageStore> {
    catalog: Catalog,
    generator: FallbackGenerator<G>,
    usage: UsageLimiter<S>,
    events: EventWriter,
    uploaded: Option<UploadedImage>,
    room: Option<RoomType>,
    style: Option<DesignStyle>,
    batch: Option<Batch>,
    generation: u64,
    cancel: CancelToken,
    file_prefix: String,
    notices: Vec<Notice>,
}

impl<G: ImageGenerator, S: UsageStore> Studio<G, S> {
    pub fn new(
        catalog: Catalog,
        generator: FallbackGenerator<G>,
        usage: UsageLimiter<S>,
        events: EventWriter,
    ) -> Self {
        Self {
            catalog,
            generator,
            usage,
            events,
            uploaded: None,
            room: None,
            style: None,
            batch: None,
            generation: 0,
            cancel: CancelToken::new(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            notices: Vec::new(),
        }
    }

    /// Uses `cancel` for the next batch, so another thread can stop it.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn generator(&self) -> &FallbackGenerator<G> {
        &self.generator
    }

    pub fn usage(&self) -> &UsageLimiter<S> {
        &self.usage
    }

    pub fn uploaded(&self) -> Option<&UploadedImage> {
        self.uploaded.as_ref()
    }

    pub fn room(&self) -> Option<&RoomType> {
        self.room.as_ref()
    }

    pub fn style(&self) -> Option<&DesignStyle> {
        self.style.as_ref()
    }

    pub fn batch(&self) -> Option<&Batch> {
        self.batch.as_ref()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn load_image(&mut self, path: &Path) -> Result<&UploadedImage> {
        match load_upload(path) {
            Ok(upload) => Ok(self.set_uploaded(upload)),
            Err(err) => {
                self.notify(Notice::destructive(
                    "Error",
                    format!("Cannot process this image: {err:#}"),
                ));
                Err(err)
            }
        }
    }

    /// Replaces the source photo. Any existing batch belongs to the old photo
    /// and is dropped.
    pub fn set_uploaded(&mut self, upload: UploadedImage) -> &UploadedImage {
        self.batch = None;
        self.emit(
            EventKind::ImageLoaded,
            json!({
                "width": upload.width,
                "height": upload.height,
            }),
        );
        self.notify(Notice::info("Photo ready", "Now choose a room and a style."));
        self.uploaded.insert(upload)
    }

    pub fn select_room(&mut self, key: &str) -> Result<RoomType, StartError> {
        let Some(room) = self.catalog.room(key).copied() else {
            return Err(self.refuse(StartError::UnknownKey {
                kind: "room",
                key: key.trim().to_string(),
            }));
        };
        self.room = Some(room);
        Ok(room)
    }

    pub fn select_style(&mut self, key: &str) -> Result<DesignStyle, StartError> {
        let Some(style) = self.catalog.style(key).copied() else {
            return Err(self.refuse(StartError::UnknownKey {
                kind: "style",
                key: key.trim().to_string(),
            }));
        };
        self.style = Some(style);
        Ok(style)
    }

    pub fn can_generate(&self) -> bool {
        self.uploaded.is_some()
            && self.room.is_some()
            && self.style.is_some()
            && self.usage.has_remaining()
    }

    /// Percent of the current batch that has settled; 0 without a batch.
    pub fn progress(&self) -> f64 {
        self.batch.as_ref().map(Batch::progress).unwrap_or(0.0)
    }

    /// Aspect ratio result cards are drawn at: the photo's, or 16:9.
    pub fn card_aspect_ratio(&self) -> f64 {
        self.uploaded
            .as_ref()
            .map(UploadedImage::aspect_ratio)
            .unwrap_or(DEFAULT_CARD_ASPECT_RATIO)
    }

    pub fn generate(&mut self) -> Result<BatchReport, StartError> {
        self.generate_with(|_| {})
    }

    /// Runs one batch of three variants and blocks until all of them settle.
    ///
    /// `observe` sees the placeholders before any request goes out and then
    /// every slot as it settles, in arrival order.
    pub fn generate_with<F>(&mut self, mut observe: F) -> Result<BatchReport, StartError>
    where
        F: FnMut(&StudioUpdate),
    {
        let (payload, room, style) = self.check_start()?;
        let cancel = self.fresh_cancel_token();
        self.generation += 1;
        let generation = self.generation;

        let mut batch = Batch::placeholders(&room, &style, generation);
        self.emit(
            EventKind::BatchStarted,
            json!({
                "generation": generation,
                "room": room.key,
                "style": style.key,
                "items": batch.items(),
            }),
        );
        observe(&StudioUpdate::BatchStarted {
            generation,
            labels: batch.items().iter().map(|item| item.id.clone()).collect(),
        });

        let generator = &self.generator;
        let events = &self.events;
        let shared_payload = &payload;
        let shared_cancel = &cancel;
        let (tx, rx) = mpsc::channel();
        thread::scope(|scope| {
            for index in 0..BATCH_SIZE {
                let tx = tx.clone();
                let payload = shared_payload;
                let cancel = shared_cancel;
                scope.spawn(move || {
                    let outcome = generator.generate(payload, cancel);
                    let _ = tx.send((index, outcome));
                });
            }
            drop(tx);

            for (index, outcome) in rx {
                if cancel.is_cancelled() {
                    continue;
                }
                let event = settle_item(&mut batch, index, outcome);
                emit_event(events, EventKind::ItemSettled, event);
                if let Some(item) = batch.get(index) {
                    observe(&StudioUpdate::ItemSettled {
                        index,
                        status: item.status,
                        progress: batch.progress(),
                    });
                }
            }
        });

        if cancel.is_cancelled() {
            log::info!("batch {generation} cancelled; results discarded");
            self.batch = None;
            self.emit(EventKind::BatchCancelled, json!({ "generation": generation }));
            return Ok(BatchReport {
                generation,
                succeeded: 0,
                failed: 0,
                remaining: self.usage.remaining(),
                cancelled: true,
            });
        }

        let remaining = match self.usage.increment() {
            Ok(remaining) => remaining,
            Err(err) => {
                log::error!("failed to record usage: {err:#}");
                let reason = error_chain_text(&err, 200);
                self.notify(Notice::destructive(
                    "Usage not saved",
                    format!("This generation could not be counted: {reason}"),
                ));
                self.usage.remaining()
            }
        };
        let report = BatchReport {
            generation,
            succeeded: batch.success_count(),
            failed: batch.failed_count(),
            remaining,
            cancelled: false,
        };
        self.batch = Some(batch);
        self.emit(
            EventKind::BatchSettled,
            json!({
                "generation": generation,
                "succeeded": report.succeeded,
                "failed": report.failed,
                "remaining": report.remaining,
            }),
        );
        self.notify(summary_notice(&report));
        Ok(report)
    }

    pub fn regenerate(&mut self, index: usize) -> Result<ItemStatus, StartError> {
        self.regenerate_with(index, |_| {})
    }

    /// Re-runs the call behind slot `index` (0-based). Only that slot
    /// changes; usage is not consumed.
    pub fn regenerate_with<F>(
        &mut self,
        index: usize,
        mut observe: F,
    ) -> Result<ItemStatus, StartError>
    where
        F: FnMut(&StudioUpdate),
    {
        let keys = self
            .batch
            .as_ref()
            .and_then(|batch| batch.get(index))
            .map(|item| (item.room_key.clone(), item.style_key.clone()));
        let Some((room_key, style_key)) = keys else {
            return Err(self.refuse(StartError::NoSuchItem(index + 1)));
        };
        let room = self.catalog.room(&room_key).copied();
        let style = self.catalog.style(&style_key).copied();
        let (Some(room), Some(style)) = (room, style) else {
            return Err(self.refuse(StartError::MissingKeys));
        };
        let payload = match self.uploaded.as_ref() {
            Some(upload) => GenerationPayload::for_upload(upload, room.name, style.base),
            None => return Err(self.refuse(StartError::NoImage)),
        };
        let cancel = self.fresh_cancel_token();

        let Some(batch) = self.batch.as_mut() else {
            return Err(StartError::NoSuchItem(index + 1));
        };
        batch.reopen(index);
        observe(&StudioUpdate::ItemReopened { index });

        let outcome = self.generator.generate(&payload, &cancel);
        let failure = outcome.as_ref().err().map(ToString::to_string);

        let Some(batch) = self.batch.as_mut() else {
            return Err(StartError::NoSuchItem(index + 1));
        };
        let mut event = settle_item(batch, index, outcome);
        let status = batch.get(index).map(|item| item.status).unwrap_or(ItemStatus::Failed);
        let progress = batch.progress();
        event.insert("regenerated".to_string(), Value::Bool(true));
        self.emit_payload(EventKind::ItemSettled, event);
        observe(&StudioUpdate::ItemSettled {
            index,
            status,
            progress,
        });

        match failure {
            None => self.notify(Notice::info(
                "Success!",
                format!("Variant {} regenerated.", index + 1),
            )),
            Some(message) => self.notify(Notice::destructive("Regeneration failed", message)),
        }
        Ok(status)
    }

    /// Crops slot `index` to `ratio` and saves it in `dir`.
    pub fn export_item(&mut self, index: usize, ratio: &str, dir: &Path) -> Result<PathBuf> {
        let Some(item) = self.batch.as_ref().and_then(|batch| batch.get(index)) else {
            return Err(StartError::NoSuchItem(index + 1).into());
        };
        let image = match (&item.status, item.image.as_deref()) {
            (ItemStatus::Success, Some(image)) => image,
            _ => anyhow::bail!("Variant {} has no image to export.", index + 1),
        };
        let saved = export::export_item(image, &item.id, ratio, &self.file_prefix, dir);

        match saved {
            Ok(path) => {
                self.emit(
                    EventKind::ImageExported,
                    json!({
                        "index": index,
                        "ratio": ratio,
                        "path": path.display().to_string(),
                    }),
                );
                self.notify(Notice::info(
                    "Downloaded!",
                    format!("Saved {}", path.display()),
                ));
                Ok(path)
            }
            Err(err) => {
                self.notify(Notice::destructive("Download failed", err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Cancels in-flight work and returns to the empty state.
    pub fn reset(&mut self) {
        self.cancel.cancel();
        self.cancel = CancelToken::new();
        self.generation += 1;
        self.batch = None;
        self.uploaded = None;
        self.room = None;
        self.style = None;
        self.emit(EventKind::Reset, json!({ "generation": self.generation }));
    }

    fn check_start(&mut self) -> Result<(GenerationPayload, RoomType, DesignStyle), StartError> {
        if self.uploaded.is_none() {
            return Err(self.refuse(StartError::NoImage));
        }
        let (Some(room), Some(style)) = (self.room, self.style) else {
            return Err(self.refuse(StartError::NoSelection));
        };
        if !self.usage.has_remaining() {
            return Err(self.refuse(StartError::LimitReached));
        }
        let payload = match self.uploaded.as_ref() {
            Some(upload) => GenerationPayload::for_upload(upload, room.name, style.base),
            None => return Err(self.refuse(StartError::NoImage)),
        };
        Ok((payload, room, style))
    }

    fn fresh_cancel_token(&mut self) -> CancelToken {
        if self.cancel.is_cancelled() {
            self.cancel = CancelToken::new();
        }
        self.cancel.clone()
    }

    fn refuse(&mut self, err: StartError) -> StartError {
        let title = match err {
            StartError::LimitReached => "Limit reached",
            StartError::MissingKeys => "Cannot regenerate",
            _ => "Error",
        };
        self.notify(Notice::destructive(title, err.to_string()));
        err
    }

    fn notify(&mut self, notice: Notice) {
        self.emit_payload(EventKind::Notice, notice.to_event_payload());
        self.notices.push(notice);
    }

    fn emit(&self, kind: EventKind, payload: Value) {
        emit_event(&self.events, kind, into_payload(payload));
    }

    fn emit_payload(&self, kind: EventKind, payload: EventPayload) {
        emit_event(&self.events, kind, payload);
    }
}

fn settle_item(
    batch: &mut Batch,
    index: usize,
    outcome: Result<Generated, GenerationError>,
) -> EventPayload {
    let mut event = into_payload(json!({
        "generation": batch.generation(),
        "index": index,
    }));
    let applied = match outcome {
        Ok(generated) => {
            event.insert("model".to_string(), Value::String(generated.model));
            event.insert("fell_back".to_string(), Value::Bool(generated.fell_back));
            batch.settle(index, ItemOutcome::Generated(generated.image))
        }
        Err(err) => {
            log::error!("variant {} failed: {err}", index + 1);
            event.insert("error".to_string(), Value::String(err.to_string()));
            batch.settle(index, ItemOutcome::Failed(err.to_string()))
        }
    };
    if let Some(item) = batch.get(index) {
        event.insert("id".to_string(), Value::String(item.id.clone()));
        event.insert(
            "status".to_string(),
            Value::String(item.status.as_str().to_string()),
        );
    }
    event.insert("applied".to_string(), Value::Bool(applied));
    event
}

fn summary_notice(report: &BatchReport) -> Notice {
    if report.succeeded > 0 {
        Notice::info(
            "Success!",
            format!(
                "Generated {} of {} visualizations.",
                report.succeeded, BATCH_SIZE
            ),
        )
    } else {
        Notice::destructive(
            "Error",
            "No visualization could be generated. Please try again.",
        )
    }
}

fn into_payload(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        _ => EventPayload::new(),
    }
}

fn emit_event(events: &EventWriter, kind: EventKind, payload: EventPayload) {
    if let Err(err) = events.emit(kind, payload) {
        log::warn!("failed to write {kind} event: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;

    use anyhow::bail;
    use restyle_contracts::batch::ItemStatus;
    use restyle_contracts::catalog::Catalog;
    use restyle_contracts::events::{event_kind, read_events, EventKind, EventWriter};
    use restyle_contracts::models::ModelSelector;
    use restyle_contracts::usage::{
        MemoryUsageStore, UsageLimiter, UsageStore, USAGE_STORAGE_KEY,
    };

    use super::{Studio, StudioUpdate};
    use crate::cancel::CancelToken;
    use crate::error::StartError;
    use crate::instruction::GenerationPayload;
    use crate::prepare::tests::{png_data_uri, write_png};
    use crate::prepare::UploadedImage;
    use crate::provider::fakes::ScriptedGenerator;
    use crate::provider::{FallbackGenerator, ImageGenerator};

    const PRIMARY: &str = "gemini-3-pro-image-preview";
    const FALLBACK: &str = "gemini-2.5-flash-image";

    fn studio<G: ImageGenerator>(
        provider: G,
        store: MemoryUsageStore,
    ) -> Studio<G, MemoryUsageStore> {
        let chain = ModelSelector::new(None).chain(None, None).unwrap();
        Studio::new(
            Catalog::default(),
            FallbackGenerator::new(provider, chain),
            UsageLimiter::new(store),
            EventWriter::disabled("studio-test"),
        )
    }

    fn ready<G: ImageGenerator>(studio: &mut Studio<G, MemoryUsageStore>) -> anyhow::Result<()> {
        studio.set_uploaded(UploadedImage::from_data_uri(png_data_uri(40, 30)?)?);
        studio.select_room("kitchen")?;
        studio.select_style("modern")?;
        Ok(())
    }

    fn stored_usage<G: ImageGenerator>(studio: &Studio<G, MemoryUsageStore>) -> Option<String> {
        studio.usage().store().get(USAGE_STORAGE_KEY)
    }

    #[test]
    fn generate_publishes_placeholders_then_settles_every_slot() -> anyhow::Result<()> {
        let provider = ScriptedGenerator::succeeding("data:image/png;base64,AAAA");
        let call_log = provider.call_log();
        let mut studio = studio(provider, MemoryUsageStore::new());
        ready(&mut studio)?;
        assert!(studio.can_generate());

        let mut updates = Vec::new();
        let mut calls_at_start = None;
        let report = studio.generate_with(|update| {
            if matches!(update, StudioUpdate::BatchStarted { .. }) {
                calls_at_start = Some(call_log.lock().unwrap().len());
            }
            updates.push(update.clone());
        })?;

        assert_eq!(calls_at_start, Some(0));
        assert_eq!(
            updates[0],
            StudioUpdate::BatchStarted {
                generation: 1,
                labels: vec![
                    "Kitchen - Modern (Variant 1)".to_string(),
                    "Kitchen - Modern (Variant 2)".to_string(),
                    "Kitchen - Modern (Variant 3)".to_string(),
                ],
            }
        );
        assert_eq!(updates.len(), 4);
        assert!(matches!(
            updates.last(),
            Some(StudioUpdate::ItemSettled { progress, .. }) if (*progress - 100.0).abs() < 1e-9
        ));

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(report.remaining, 4);
        assert!(!report.cancelled);
        assert_eq!(studio.progress(), 100.0);
        assert_eq!(stored_usage(&studio).as_deref(), Some("1"));

        let batch = studio.batch().unwrap();
        let labels: Vec<&str> = batch.items().iter().map(|item| item.id.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Kitchen - Modern (Variant 1)",
                "Kitchen - Modern (Variant 2)",
                "Kitchen - Modern (Variant 3)",
            ]
        );
        assert!(batch.items().iter().all(|item| item.status == ItemStatus::Success
            && item.image.as_deref() == Some("data:image/png;base64,AAAA")));

        let notice = studio.notices().last().unwrap();
        assert_eq!(notice.description, "Generated 3 of 3 visualizations.");
        assert!(!notice.is_destructive());
        Ok(())
    }

    #[test]
    fn partial_failure_keeps_successful_slots_and_counts_once() -> anyhow::Result<()> {
        let provider = ScriptedGenerator::failing("model overloaded");
        provider.push(PRIMARY, Ok("img-only"));
        let mut studio = studio(provider, MemoryUsageStore::new());
        ready(&mut studio)?;

        let report = studio.generate()?;
        assert_eq!((report.succeeded, report.failed), (1, 2));
        assert_eq!(stored_usage(&studio).as_deref(), Some("1"));

        let batch = studio.batch().unwrap();
        for item in batch.items() {
            match item.status {
                ItemStatus::Success => assert_eq!(item.image.as_deref(), Some("img-only")),
                ItemStatus::Failed => assert!(item.image.is_none()),
                ItemStatus::Pending => panic!("slot left pending"),
            }
        }
        let notice = studio.notices().last().unwrap();
        assert_eq!(notice.description, "Generated 1 of 3 visualizations.");
        Ok(())
    }

    #[test]
    fn all_failures_still_consume_one_use() -> anyhow::Result<()> {
        let mut studio = studio(
            ScriptedGenerator::failing("quota exceeded"),
            MemoryUsageStore::new(),
        );
        ready(&mut studio)?;

        let report = studio.generate()?;
        assert_eq!((report.succeeded, report.failed), (0, 3));
        assert_eq!(report.remaining, 4);
        assert_eq!(studio.generator().provider().calls().len(), 6);
        assert!(studio.notices().last().unwrap().is_destructive());
        assert_eq!(studio.progress(), 100.0);
        Ok(())
    }

    #[test]
    fn primary_failures_fall_back_per_slot() -> anyhow::Result<()> {
        let provider = ScriptedGenerator::succeeding("fallback-img");
        for _ in 0..3 {
            provider.push(PRIMARY, Err("503"));
        }
        let mut studio = studio(provider, MemoryUsageStore::new());
        ready(&mut studio)?;

        let report = studio.generate()?;
        assert_eq!(report.succeeded, 3);
        let calls = studio.generator().provider().calls();
        assert_eq!(calls.iter().filter(|model| *model == PRIMARY).count(), 3);
        assert_eq!(calls.iter().filter(|model| *model == FALLBACK).count(), 3);
        assert!(studio.notices().iter().all(|notice| !notice.is_destructive()));
        Ok(())
    }

    #[test]
    fn start_preconditions_refuse_without_network() -> anyhow::Result<()> {
        let mut studio = studio(
            ScriptedGenerator::succeeding("img"),
            MemoryUsageStore::with_value(USAGE_STORAGE_KEY, "5"),
        );

        assert_eq!(studio.generate(), Err(StartError::NoImage));
        studio.set_uploaded(UploadedImage::from_data_uri(png_data_uri(40, 30)?)?);
        assert_eq!(studio.generate(), Err(StartError::NoSelection));
        studio.select_room("kitchen")?;
        assert_eq!(studio.generate(), Err(StartError::NoSelection));
        studio.select_style("modern")?;
        assert!(!studio.can_generate());
        assert_eq!(studio.generate(), Err(StartError::LimitReached));

        assert!(studio.generator().provider().calls().is_empty());
        assert!(studio.batch().is_none());
        assert_eq!(stored_usage(&studio).as_deref(), Some("5"));
        let last = studio.notices().last().unwrap();
        assert!(last.is_destructive());
        assert_eq!(last.title, "Limit reached");
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected_and_leave_selection_alone() -> anyhow::Result<()> {
        let mut studio = studio(ScriptedGenerator::succeeding("img"), MemoryUsageStore::new());
        studio.select_room("Living Room")?;
        assert_eq!(
            studio.select_room("garage"),
            Err(StartError::UnknownKey {
                kind: "room",
                key: "garage".to_string()
            })
        );
        assert_eq!(studio.room().map(|room| room.key), Some("living_room"));
        assert!(studio.select_style("rococo").is_err());
        assert!(studio.style().is_none());
        Ok(())
    }

    /// Blocks every call until all three are in flight at once.
    struct RendezvousGenerator {
        arrived: Mutex<usize>,
        all_here: Condvar,
        timed_out: Mutex<bool>,
    }

    impl ImageGenerator for RendezvousGenerator {
        fn name(&self) -> &str {
            "rendezvous"
        }

        fn generate(&self, _model: &str, _payload: &GenerationPayload) -> anyhow::Result<String> {
            let mut arrived = self.arrived.lock().unwrap();
            *arrived += 1;
            let ticket = *arrived;
            self.all_here.notify_all();
            let (_guard, wait) = self
                .all_here
                .wait_timeout_while(arrived, Duration::from_secs(5), |count| *count < 3)
                .unwrap();
            if wait.timed_out() {
                *self.timed_out.lock().unwrap() = true;
                bail!("calls were not concurrent");
            }
            Ok(format!("img-{ticket}"))
        }
    }

    #[test]
    fn batch_calls_run_concurrently() -> anyhow::Result<()> {
        let provider = RendezvousGenerator {
            arrived: Mutex::new(0),
            all_here: Condvar::new(),
            timed_out: Mutex::new(false),
        };
        let mut studio = studio(provider, MemoryUsageStore::new());
        ready(&mut studio)?;

        let report = studio.generate()?;
        assert_eq!(report.succeeded, 3);
        assert!(!*studio.generator().provider().timed_out.lock().unwrap());
        Ok(())
    }

    #[test]
    fn regenerate_touches_only_its_slot_and_keeps_usage() -> anyhow::Result<()> {
        let provider = ScriptedGenerator::succeeding("img-first");
        let mut studio = studio(provider, MemoryUsageStore::new());
        ready(&mut studio)?;
        studio.generate()?;
        let before = studio.batch().unwrap().clone();

        studio.generator().provider().push(PRIMARY, Ok("img-second"));
        let mut updates = Vec::new();
        let status = studio.regenerate_with(1, |update| updates.push(update.clone()))?;
        assert_eq!(status, ItemStatus::Success);
        assert_eq!(updates[0], StudioUpdate::ItemReopened { index: 1 });

        let after = studio.batch().unwrap();
        assert_eq!(after.items()[0], before.items()[0]);
        assert_eq!(after.items()[2], before.items()[2]);
        assert_eq!(after.items()[1].image.as_deref(), Some("img-second"));
        assert_eq!(after.items()[1].id, "Kitchen - Modern (Variant 2)");
        assert_eq!(stored_usage(&studio).as_deref(), Some("1"));
        assert_eq!(
            studio.notices().last().unwrap().description,
            "Variant 2 regenerated."
        );
        Ok(())
    }

    #[test]
    fn regenerate_failure_marks_slot_failed_with_notice() -> anyhow::Result<()> {
        let provider = ScriptedGenerator::succeeding("img");
        let mut studio = studio(provider, MemoryUsageStore::new());
        ready(&mut studio)?;
        studio.generate()?;

        studio.generator().provider().push(PRIMARY, Err("primary down"));
        studio.generator().provider().push(FALLBACK, Err("fallback down"));
        assert_eq!(studio.regenerate(0)?, ItemStatus::Failed);

        let batch = studio.batch().unwrap();
        assert_eq!(batch.items()[0].status, ItemStatus::Failed);
        assert_eq!(batch.items()[1].status, ItemStatus::Success);
        let notice = studio.notices().last().unwrap();
        assert!(notice.is_destructive());
        assert_eq!(notice.description, "fallback down");
        Ok(())
    }

    #[test]
    fn regenerate_rejects_missing_slots() -> anyhow::Result<()> {
        let mut studio = studio(ScriptedGenerator::succeeding("img"), MemoryUsageStore::new());
        ready(&mut studio)?;
        assert_eq!(studio.regenerate(0), Err(StartError::NoSuchItem(1)));
        studio.generate()?;
        assert_eq!(studio.regenerate(5), Err(StartError::NoSuchItem(6)));
        assert_eq!(studio.generator().provider().calls().len(), 3);
        Ok(())
    }

    /// Cancels the shared token from inside the first call it receives.
    struct CancellingGenerator {
        cancel: CancelToken,
        calls: Mutex<Vec<String>>,
    }

    impl ImageGenerator for CancellingGenerator {
        fn name(&self) -> &str {
            "cancelling"
        }

        fn generate(&self, model: &str, _payload: &GenerationPayload) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push(model.to_string());
            self.cancel.cancel();
            bail!("connection reset")
        }
    }

    #[test]
    fn cancelled_batch_discards_results_and_keeps_usage() -> anyhow::Result<()> {
        let cancel = CancelToken::new();
        let provider = CancellingGenerator {
            cancel: cancel.clone(),
            calls: Mutex::new(Vec::new()),
        };
        let mut studio = studio(provider, MemoryUsageStore::new()).with_cancel_token(cancel);
        ready(&mut studio)?;

        let report = studio.generate()?;
        assert!(report.cancelled);
        assert_eq!(report.remaining, 5);
        assert!(studio.batch().is_none());
        assert_eq!(stored_usage(&studio), None);
        let calls = studio.generator().provider().calls.lock().unwrap().clone();
        assert!(!calls.is_empty());
        assert!(calls.iter().all(|model| model == PRIMARY));
        Ok(())
    }

    #[test]
    fn reset_returns_to_empty_state() -> anyhow::Result<()> {
        let mut studio = studio(ScriptedGenerator::succeeding("img"), MemoryUsageStore::new());
        assert_eq!(studio.card_aspect_ratio(), 16.0 / 9.0);
        ready(&mut studio)?;
        assert!((studio.card_aspect_ratio() - 4.0 / 3.0).abs() < 1e-9);
        studio.generate()?;
        let handle = studio.cancel_handle();

        studio.reset();
        assert!(handle.is_cancelled());
        assert!(!studio.cancel_handle().is_cancelled());
        assert!(studio.batch().is_none());
        assert!(studio.uploaded().is_none());
        assert!(studio.room().is_none() && studio.style().is_none());
        assert_eq!(studio.progress(), 0.0);
        assert!(!studio.can_generate());
        assert_eq!(stored_usage(&studio).as_deref(), Some("1"));

        ready(&mut studio)?;
        let report = studio.generate()?;
        assert_eq!(report.generation, 3);
        assert_eq!(report.remaining, 3);
        Ok(())
    }

    #[test]
    fn load_image_reports_bad_files_and_clears_batch_on_success() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let junk = temp.path().join("notes.png");
        std::fs::write(&junk, "not an image")?;
        let photo = temp.path().join("room.png");
        write_png(&photo, 64, 48)?;

        let mut studio = studio(ScriptedGenerator::succeeding("img"), MemoryUsageStore::new());
        assert!(studio.load_image(&junk).is_err());
        assert!(studio.uploaded().is_none());
        assert!(studio.notices().last().unwrap().is_destructive());

        ready(&mut studio)?;
        studio.generate()?;
        let loaded = studio.load_image(&photo)?;
        assert_eq!((loaded.width, loaded.height), (64, 48));
        assert!(studio.batch().is_none());
        assert!(studio.can_generate());
        Ok(())
    }

    #[test]
    fn export_item_saves_cropped_variant() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let image = png_data_uri(400, 300)?;
        let mut studio = studio(ScriptedGenerator::succeeding(&image), MemoryUsageStore::new());
        ready(&mut studio)?;
        studio.generate()?;

        let path = studio.export_item(2, "1:1", temp.path())?;
        let name = path.file_name().and_then(|name| name.to_str()).unwrap_or_default();
        assert!(name.starts_with("interior-kitchen-modern-variant-3-1x1-"));
        let saved = image::open(&path)?;
        assert_eq!((saved.width(), saved.height()), (300, 300));
        assert_eq!(studio.notices().last().unwrap().title, "Downloaded!");

        assert!(studio.export_item(7, "1:1", temp.path()).is_err());
        Ok(())
    }

    #[test]
    fn events_trace_the_batch_lifecycle() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let chain = ModelSelector::new(None).chain(None, None).unwrap();
        let mut studio = Studio::new(
            Catalog::default(),
            FallbackGenerator::new(ScriptedGenerator::succeeding("img"), chain),
            UsageLimiter::new(MemoryUsageStore::new()),
            EventWriter::new(&events_path, "run-1"),
        );
        ready(&mut studio)?;
        studio.generate()?;

        let kinds: Vec<EventKind> = read_events(&events_path)?
            .iter()
            .filter_map(event_kind)
            .filter(|kind| *kind != EventKind::Notice)
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::ImageLoaded,
                EventKind::BatchStarted,
                EventKind::ItemSettled,
                EventKind::ItemSettled,
                EventKind::ItemSettled,
                EventKind::BatchSettled,
            ]
        );
        assert!(kinds.last().is_some_and(|kind| kind.ends_batch()));
        Ok(())
    }

    /// Answers each call with the next ticket, releasing calls newest first.
    /// A call returns only after every later ticket has been settled.
    struct ReverseOrderGenerator<'a> {
        gate: &'a ReleaseGate,
    }

    #[derive(Default)]
    struct ReleaseGate {
        state: Mutex<(usize, usize)>,
        turn: Condvar,
    }

    impl ReleaseGate {
        fn settled(&self) {
            self.state.lock().unwrap().1 += 1;
            self.turn.notify_all();
        }
    }

    impl ImageGenerator for ReverseOrderGenerator<'_> {
        fn name(&self) -> &str {
            "reverse-order"
        }

        fn generate(&self, _model: &str, _payload: &GenerationPayload) -> anyhow::Result<String> {
            let mut state = self.gate.state.lock().unwrap();
            state.0 += 1;
            let ticket = state.0;
            self.gate.turn.notify_all();
            let (_state, wait) = self
                .gate
                .turn
                .wait_timeout_while(state, Duration::from_secs(5), |(arrived, settled)| {
                    *arrived < 3 || *settled < 3usize.saturating_sub(ticket)
                })
                .unwrap();
            if wait.timed_out() {
                bail!("ticket {ticket} was never released");
            }
            Ok(format!("img-{ticket}"))
        }
    }

    #[test]
    fn reverse_completion_order_settles_each_result_in_its_own_slot() -> anyhow::Result<()> {
        let gate = ReleaseGate::default();
        let mut studio = studio(ReverseOrderGenerator { gate: &gate }, MemoryUsageStore::new());
        ready(&mut studio)?;

        let mut settled = Vec::new();
        let report = studio.generate_with(|update| {
            if let StudioUpdate::ItemSettled { index, status, .. } = update {
                settled.push((*index, *status));
                gate.settled();
            }
        })?;
        assert_eq!(report.succeeded, 3);
        assert_eq!(settled.len(), 3);

        let batch = studio.batch().unwrap();
        for (order, (index, status)) in settled.iter().enumerate() {
            assert_eq!(*status, ItemStatus::Success);
            let expected = format!("img-{}", 3 - order);
            assert_eq!(batch.items()[*index].image.as_deref(), Some(expected.as_str()));
        }
        let mut indices: Vec<usize> = settled.iter().map(|(index, _)| *index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2]);
        for (slot, item) in batch.items().iter().enumerate() {
            assert_eq!(item.id, format!("Kitchen - Modern (Variant {})", slot + 1));
        }
        Ok(())
    }

    /// Reads fine, refuses every write.
    struct ReadOnlyUsageStore;

    impl UsageStore for ReadOnlyUsageStore {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }

        fn set(&mut self, _key: &str, _value: &str) -> anyhow::Result<()> {
            bail!("usage file is read-only")
        }
    }

    #[test]
    fn usage_write_failure_is_surfaced_as_a_notice() -> anyhow::Result<()> {
        let chain = ModelSelector::new(None).chain(None, None).unwrap();
        let mut studio = Studio::new(
            Catalog::default(),
            FallbackGenerator::new(ScriptedGenerator::succeeding("img"), chain),
            UsageLimiter::new(ReadOnlyUsageStore),
            EventWriter::disabled("studio-test"),
        );
        studio.set_uploaded(UploadedImage::from_data_uri(png_data_uri(40, 30)?)?);
        studio.select_room("kitchen")?;
        studio.select_style("modern")?;

        let report = studio.generate()?;
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.remaining, 5);

        let warning = studio
            .notices()
            .iter()
            .find(|notice| notice.title == "Usage not saved")
            .expect("usage failure notice");
        assert!(warning.is_destructive());
        assert!(warning.description.contains("usage file is read-only"));
        assert_eq!(
            studio.notices().last().unwrap().description,
            "Generated 3 of 3 visualizations."
        );
        Ok(())
    }
}

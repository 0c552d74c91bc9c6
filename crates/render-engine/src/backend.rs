//! The orchestrator front ends talk to.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vgmsplit_common::config::{RenderDefaults, Settings};
use vgmsplit_common::error::{SplitError, SplitResult};
use vgmsplit_playback::gzip;

use crate::job::RenderJobHandle;
use crate::metadata::{
    extract_metadata, format_error, sort_channels, Channel, ChipDevice, FileMetadata,
};
use crate::scheduler::{AggregateProgress, RenderScheduler};

/// Loaded file, its metadata, and the render batch.
#[derive(Debug)]
pub struct Backend {
    settings: Settings,
    defaults: RenderDefaults,
    file_path: Option<PathBuf>,
    data: Option<Arc<[u8]>>,
    metadata: Option<FileMetadata>,
    scheduler: RenderScheduler,
}

impl Backend {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            defaults: RenderDefaults::default(),
            file_path: None,
            data: None,
            metadata: None,
            scheduler: RenderScheduler::new(),
        }
    }

    pub fn with_render_defaults(mut self, defaults: RenderDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Re-read the settings file, repairing invalid entries.
    pub fn reload_settings(&mut self) {
        self.settings.reload();
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn metadata(&self) -> Option<&FileMetadata> {
        self.metadata.as_ref()
    }

    /// Load a file, replacing the current one.
    ///
    /// On failure the previously loaded file stays.
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> SplitResult<()> {
        let path = path.as_ref();
        if self.is_rendering() {
            return Err(SplitError::concurrency_state(
                "Cannot load a file while rendering",
            ));
        }

        let raw = std::fs::read(path).map_err(|e| SplitError::file_io(path, &e))?;
        // Inflate once here so jobs parse the plain image.
        let bytes = gzip::inflate(&raw).map_err(format_error)?.into_owned();
        let metadata = extract_metadata(&bytes, &self.settings.app_settings())?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "Loaded file");

        self.data = Some(Arc::from(bytes));
        self.metadata = Some(metadata);
        self.file_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Begin editing chip order and channel selection.
    ///
    /// Channel order is re-derived from chip order when the batch ends.
    pub fn begin_edit(&mut self) -> Option<EditBatch<'_>> {
        self.metadata.as_mut().map(|metadata| EditBatch { metadata })
    }

    /// Render the master mix to `path` and each enabled channel beside it.
    pub fn start_render(&mut self, path: impl AsRef<Path>) -> Result<(), Vec<SplitError>> {
        let (Some(data), Some(metadata)) = (&self.data, &self.metadata) else {
            return Err(vec![SplitError::Other(anyhow::anyhow!("No file loaded"))]);
        };
        // Jobs keep this snapshot; later edits do not reach them.
        let snapshot = Arc::new(metadata.clone());
        self.scheduler
            .start_render(data, &snapshot, &self.defaults, path.as_ref())
    }

    pub fn is_rendering(&self) -> bool {
        self.scheduler.is_rendering()
    }

    pub fn cancel_render(&self) {
        self.scheduler.cancel_render();
    }

    pub fn render_jobs(&self) -> &[RenderJobHandle] {
        self.scheduler.render_jobs()
    }

    pub fn progress(&self) -> AggregateProgress {
        self.scheduler.progress()
    }
}

/// Open edit on the loaded file's chips and channels. Commits on drop.
#[derive(Debug)]
pub struct EditBatch<'a> {
    metadata: &'a mut FileMetadata,
}

impl EditBatch<'_> {
    pub fn chips(&self) -> &[ChipDevice] {
        &self.metadata.devices
    }

    /// Chips in display order. Reordering them reorders their channels.
    pub fn chips_mut(&mut self) -> &mut Vec<ChipDevice> {
        &mut self.metadata.devices
    }

    pub fn channels(&self) -> &[Channel] {
        &self.metadata.channels
    }

    pub fn channels_mut(&mut self) -> &mut [Channel] {
        &mut self.metadata.channels
    }

    pub fn commit(self) {}
}

impl Drop for EditBatch<'_> {
    fn drop(&mut self) {
        self.metadata.channels = sort_channels(&self.metadata.devices, &self.metadata.channels);
        if let Some(master) = self.metadata.channels.first_mut() {
            master.enabled = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgmsplit_playback::vgm::VgmBuilder;
    use vgmsplit_playback::ChipType;

    fn write_fixture(dir: &Path) -> PathBuf {
        let mut b = VgmBuilder::new();
        b.chip(ChipType::Sn76496, 3_579_545, false)
            .chip(ChipType::Ym2612, 7_670_453, false)
            .wait(441);
        let path = dir.join("song.vgm");
        std::fs::write(&path, b.build()).unwrap();
        path
    }

    #[test]
    fn test_render_without_file_is_rejected() {
        let mut backend = Backend::new(Settings::in_memory());
        let errors = backend
            .start_render("/tmp/never-written.wav")
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(backend.render_jobs().is_empty());
    }

    #[test]
    fn test_load_missing_file_keeps_os_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = Backend::new(Settings::in_memory());
        let err = backend.load_path(dir.path().join("missing.vgm")).unwrap_err();
        assert!(err.is_file_io());
        assert!(backend.metadata().is_none());
    }

    #[test]
    fn test_failed_load_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_fixture(dir.path());
        let bad = dir.path().join("bad.vgm");
        std::fs::write(&bad, b"nope").unwrap();

        let mut backend = Backend::new(Settings::in_memory());
        backend.load_path(&good).unwrap();
        assert!(matches!(backend.load_path(&bad), Err(SplitError::Format(_))));
        assert_eq!(backend.file_path(), Some(good.as_path()));
        assert_eq!(backend.metadata().unwrap().devices.len(), 2);
    }

    #[test]
    fn test_load_vgz_keeps_inflated_image() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let plain = std::fs::read(write_fixture(dir.path())).unwrap();
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(&plain).unwrap();
        let vgz = dir.path().join("song.vgz");
        std::fs::write(&vgz, enc.finish().unwrap()).unwrap();

        let mut backend = Backend::new(Settings::in_memory());
        backend.load_path(&vgz).unwrap();
        assert_eq!(backend.data.as_deref(), Some(plain.as_slice()));
        assert_eq!(backend.metadata().unwrap().devices.len(), 2);
    }

    #[test]
    fn test_edit_batch_reorders_channels_by_chip() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = Backend::new(Settings::in_memory());
        backend.load_path(write_fixture(dir.path())).unwrap();

        {
            let mut edit = backend.begin_edit().unwrap();
            edit.chips_mut().swap(0, 1);
            edit.channels_mut()[0].enabled = false;
            edit.channels_mut()[1].enabled = false;
            edit.commit();
        }

        let meta = backend.metadata().unwrap();
        assert_eq!(meta.devices[0].name, "YM2612");
        assert!(meta.channels[0].is_master());
        assert!(meta.channels[0].enabled);
        assert_eq!(meta.channels[1].name, "YM2612 - Channel 1");
        assert_eq!(meta.channels[8].name, "SN76496 - Channel 1");
        assert!(!meta.channels[8].enabled);
    }
}

use core::sync::atomic::{AtomicBool, Ordering};

use log::error;

use crate::backend::{FlashBackend, SdCard, SdMmcBackend, StorageBackend, WearLevelVolume};
use crate::error::ErrorKind;
use crate::scsi::SenseData;

/// Set while a storage handle exists. Exactly one backend may be exposed to
/// the protocol engine at a time; init/deinit and callback registration are
/// serialized by the caller, not by this flag.
static STORAGE_ACTIVE: AtomicBool = AtomicBool::new(false);

/// `max_files` fallback when the caller supplies a non-positive value.
pub const DEFAULT_MAX_FILES: i32 = 2;

/// Event kind as carried across the protocol-glue boundary. Values outside
/// the known set are representable so that registration can reject them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventKind(pub u8);

impl EventKind {
    pub const MOUNT_CHANGED: EventKind = EventKind(0);
    pub const PREMOUNT_CHANGED: EventKind = EventKind(1);
}

/// Payload handed to mount observers.
#[derive(Debug, Clone, Copy)]
pub struct MountEvent {
    pub kind: EventKind,
    pub is_mounted: bool,
}

pub type MscCallback = fn(&MountEvent);

/// Init-time settings shared by both backends.
pub struct Config {
    /// Maximum simultaneously open files for the mounting layer above;
    /// values <= 0 fall back to [`DEFAULT_MAX_FILES`].
    pub max_files: i32,
    pub callback_mount_changed: Option<MscCallback>,
    pub callback_premount_changed: Option<MscCallback>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_files: DEFAULT_MAX_FILES,
            callback_mount_changed: None,
            callback_premount_changed: None,
        }
    }
}

/// The storage handle behind the MSC responder.
///
/// Owns the backend selected at init time; the selection cannot change
/// without dropping the handle and constructing a new one. All SCSI command
/// entry points live on this type (see `scsi.rs`).
pub struct MscStorage<B: StorageBackend> {
    pub(crate) backend: B,
    max_files: i32,
    callback_mount_changed: Option<MscCallback>,
    callback_premount_changed: Option<MscCallback>,
    pub(crate) sense: Option<SenseData>,
}

fn install<B: StorageBackend>(backend: B, config: Config) -> Result<MscStorage<B>, ErrorKind> {
    if STORAGE_ACTIVE
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        error!("a storage handle already exists");
        return Err(ErrorKind::AlreadyInitialized);
    }
    let max_files = if config.max_files > 0 {
        config.max_files
    } else {
        DEFAULT_MAX_FILES
    };
    Ok(MscStorage {
        backend,
        max_files,
        callback_mount_changed: config.callback_mount_changed,
        callback_premount_changed: config.callback_premount_changed,
        sense: None,
    })
}

impl<W: WearLevelVolume> MscStorage<FlashBackend<W>> {
    /// Expose a wear-leveled flash partition as the MSC medium.
    pub fn init_flash(volume: W, config: Config) -> Result<Self, ErrorKind> {
        install(FlashBackend::new(volume), config)
    }
}

impl<C: SdCard> MscStorage<SdMmcBackend<C>> {
    /// Expose an SD/MMC card as the MSC medium.
    pub fn init_sdmmc(card: C, config: Config) -> Result<Self, ErrorKind> {
        install(SdMmcBackend::new(card), config)
    }
}

impl<B: StorageBackend> MscStorage<B> {
    /// Release the handle. Dropping it has the same effect.
    pub fn deinit(self) {}

    pub fn sector_count(&self) -> u32 {
        self.backend.sector_count()
    }

    pub fn sector_size(&self) -> u32 {
        self.backend.sector_size()
    }

    pub fn max_files(&self) -> i32 {
        self.max_files
    }

    pub fn register_callback(
        &mut self,
        kind: EventKind,
        callback: MscCallback,
    ) -> Result<(), ErrorKind> {
        match kind {
            EventKind::MOUNT_CHANGED => {
                self.callback_mount_changed = Some(callback);
                Ok(())
            }
            EventKind::PREMOUNT_CHANGED => {
                self.callback_premount_changed = Some(callback);
                Ok(())
            }
            EventKind(other) => {
                error!("wrong event type {}", other);
                Err(ErrorKind::InvalidArgument)
            }
        }
    }

    pub fn unregister_callback(&mut self, kind: EventKind) -> Result<(), ErrorKind> {
        match kind {
            EventKind::MOUNT_CHANGED => {
                self.callback_mount_changed = None;
                Ok(())
            }
            EventKind::PREMOUNT_CHANGED => {
                self.callback_premount_changed = None;
                Ok(())
            }
            EventKind(other) => {
                error!("wrong event type {}", other);
                Err(ErrorKind::InvalidArgument)
            }
        }
    }

    /// Fire the mount-changed observer, if one is registered. Called by the
    /// protocol glue after the exposed medium changes mount state.
    pub fn notify_mount_changed(&self, is_mounted: bool) {
        if let Some(callback) = self.callback_mount_changed {
            callback(&MountEvent {
                kind: EventKind::MOUNT_CHANGED,
                is_mounted,
            });
        }
    }

    /// Fire the premount-changed observer, if one is registered. Called by
    /// the protocol glue just before the mount state changes.
    pub fn notify_premount_changed(&self, is_mounted: bool) {
        if let Some(callback) = self.callback_premount_changed {
            callback(&MountEvent {
                kind: EventKind::PREMOUNT_CHANGED,
                is_mounted,
            });
        }
    }
}

impl<B: StorageBackend> Drop for MscStorage<B> {
    fn drop(&mut self) {
        STORAGE_ACTIVE.store(false, Ordering::Release);
    }
}

/// The active-handle flag is process-wide, so tests that construct handles
/// must not run concurrently.
#[cfg(test)]
pub(crate) fn serialize_handle_tests() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockCard, MockVolume};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn second_init_is_rejected_until_deinit() {
        let _guard = serialize_handle_tests();
        init_logging();
        let storage = MscStorage::init_flash(MockVolume::new(16, 512), Config::default()).unwrap();
        let err = MscStorage::init_flash(MockVolume::new(16, 512), Config::default())
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err, ErrorKind::AlreadyInitialized);
        let err = MscStorage::init_sdmmc(MockCard::new(32, 512), Config::default())
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err, ErrorKind::AlreadyInitialized);

        storage.deinit();
        let storage = MscStorage::init_sdmmc(MockCard::new(32, 512), Config::default()).unwrap();
        assert_eq!(storage.sector_count(), 32);
    }

    #[test]
    fn non_positive_max_files_defaults_to_two() {
        let _guard = serialize_handle_tests();
        let storage = MscStorage::init_flash(
            MockVolume::new(16, 512),
            Config {
                max_files: 0,
                ..Config::default()
            },
        )
        .unwrap();
        assert_eq!(storage.max_files(), DEFAULT_MAX_FILES);
        storage.deinit();

        let storage = MscStorage::init_flash(
            MockVolume::new(16, 512),
            Config {
                max_files: -3,
                ..Config::default()
            },
        )
        .unwrap();
        assert_eq!(storage.max_files(), DEFAULT_MAX_FILES);
        storage.deinit();

        let storage = MscStorage::init_flash(
            MockVolume::new(16, 512),
            Config {
                max_files: 5,
                ..Config::default()
            },
        )
        .unwrap();
        assert_eq!(storage.max_files(), 5);
    }

    #[test]
    fn geometry_forwards_to_backend() {
        let _guard = serialize_handle_tests();
        let storage = MscStorage::init_flash(MockVolume::new(16, 512), Config::default()).unwrap();
        assert_eq!(storage.sector_count(), 16);
        assert_eq!(storage.sector_size(), 512);
    }

    static MOUNT_CALLS: AtomicUsize = AtomicUsize::new(0);
    static PREMOUNT_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn on_mount(event: &MountEvent) {
        assert_eq!(event.kind, EventKind::MOUNT_CHANGED);
        MOUNT_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    fn on_premount(event: &MountEvent) {
        assert_eq!(event.kind, EventKind::PREMOUNT_CHANGED);
        PREMOUNT_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn callbacks_register_fire_and_unregister() {
        let _guard = serialize_handle_tests();
        MOUNT_CALLS.store(0, Ordering::SeqCst);
        PREMOUNT_CALLS.store(0, Ordering::SeqCst);

        let mut storage =
            MscStorage::init_flash(MockVolume::new(16, 512), Config::default()).unwrap();
        storage.notify_mount_changed(true);
        assert_eq!(MOUNT_CALLS.load(Ordering::SeqCst), 0);

        storage
            .register_callback(EventKind::MOUNT_CHANGED, on_mount)
            .unwrap();
        storage
            .register_callback(EventKind::PREMOUNT_CHANGED, on_premount)
            .unwrap();
        storage.notify_premount_changed(true);
        storage.notify_mount_changed(true);
        assert_eq!(MOUNT_CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(PREMOUNT_CALLS.load(Ordering::SeqCst), 1);

        storage.unregister_callback(EventKind::MOUNT_CHANGED).unwrap();
        storage.notify_mount_changed(false);
        assert_eq!(MOUNT_CALLS.load(Ordering::SeqCst), 1);
    }

    fn never_called(_event: &MountEvent) {
        panic!("callback registered under an unknown event kind");
    }

    #[test]
    fn unknown_event_kind_is_invalid_argument_and_leaves_state_alone() {
        let _guard = serialize_handle_tests();
        MOUNT_CALLS.store(0, Ordering::SeqCst);

        let mut storage =
            MscStorage::init_flash(MockVolume::new(16, 512), Config::default()).unwrap();
        storage
            .register_callback(EventKind::MOUNT_CHANGED, on_mount)
            .unwrap();

        let err = storage
            .register_callback(EventKind(0x7F), never_called)
            .unwrap_err();
        assert_eq!(err, ErrorKind::InvalidArgument);
        let err = storage.unregister_callback(EventKind(0x7F)).unwrap_err();
        assert_eq!(err, ErrorKind::InvalidArgument);

        // The previously registered observer is untouched.
        storage.notify_mount_changed(true);
        assert_eq!(MOUNT_CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn config_callbacks_are_bound_at_init() {
        let _guard = serialize_handle_tests();
        MOUNT_CALLS.store(0, Ordering::SeqCst);

        let storage = MscStorage::init_flash(
            MockVolume::new(16, 512),
            Config {
                callback_mount_changed: Some(on_mount),
                ..Config::default()
            },
        )
        .unwrap();
        storage.notify_mount_changed(true);
        assert_eq!(MOUNT_CALLS.load(Ordering::SeqCst), 1);
        // No premount observer was supplied; notifying is a no-op.
        storage.notify_premount_changed(true);
    }
}

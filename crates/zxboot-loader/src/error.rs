use zxboot_net::FatalError;
use zxboot_snapshot::SnapshotError;

/// Every decoder failure is reported as an incompatible image.
pub(crate) trait SnapshotResultExt<T> {
    fn or_incompatible(self) -> zxboot_net::Result<T>;
}

impl<T> SnapshotResultExt<T> for Result<T, SnapshotError> {
    fn or_incompatible(self) -> zxboot_net::Result<T> {
        self.map_err(|err| FatalError::Incompatible(err.to_string()))
    }
}

use gavel_backup::BackupError;
use gavel_core::{CoreError, ScaleTarget};
use gavel_loader::LoaderError;
use gavel_nosql::NosqlError;
use gavel_remote::RemoteError;
use thiserror::Error;

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Nosql(#[from] NosqlError),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Services(#[from] anyhow::Error),

    #[error("data services are not up after {stage}")]
    ServicesDown { stage: &'static str },

    #[error("data for {target} did not verify after loading; see loadData.log")]
    LoadFailed { target: ScaleTarget },

    #[error(
        "data for {target} is not loaded and no matching backup exists; \
         rerun with --load-db to load it"
    )]
    DataMissing { target: ScaleTarget },

    #[error("auction preparation for {target} failed; see prepareData.log")]
    PrepareFailed { target: ScaleTarget },
}

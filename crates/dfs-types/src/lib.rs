//! Types shared by dfs naming and storage servers and their clients.
//!
//! - [`DfsPath`]: absolute, component-ordered file-system paths
//! - [`FsError`]: the error taxonomy every remote operation reports
//! - [`api`]: the `Storage`, `Command`, `Service` and `Registration`
//!   interfaces, their stubs, and their server-side skeletons
//! - [`constants`]: well-known ports and tuning values

pub mod api;
pub mod constants;
pub mod error;
pub mod path;

pub use api::{
    Command, CommandApi, CommandSkeleton, CommandStub, Registration, RegistrationApi,
    RegistrationSkeleton, RegistrationStub, Service, ServiceApi, ServiceSkeleton, ServiceStub,
    Storage, StorageApi, StorageSkeleton, StorageStub,
};
pub use error::{ErrorKind, FsError, FsResult};
pub use path::DfsPath;

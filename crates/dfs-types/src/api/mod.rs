//! The four remote interfaces.
//!
//! Each module declares an interface marker, the async trait implemented by
//! the serving side, the trait implementation on its [`dfs_rpc::Stub`], and
//! a skeleton that dispatches RPC calls into a local implementation.
//!
//! | Interface      | Served by     | Called by              |
//! |----------------|---------------|------------------------|
//! | `Storage`      | storage node  | clients, other nodes   |
//! | `Command`      | storage node  | naming service         |
//! | `Service`      | naming server | clients                |
//! | `Registration` | naming server | storage nodes          |

pub mod command;
pub mod registration;
pub mod service;
pub mod storage;

pub use command::{Command, CommandApi, CommandSkeleton, CommandStub};
pub use registration::{Registration, RegistrationApi, RegistrationSkeleton, RegistrationStub};
pub use service::{Service, ServiceApi, ServiceSkeleton, ServiceStub};
pub use storage::{Storage, StorageApi, StorageSkeleton, StorageStub};

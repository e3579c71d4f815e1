//! The naming server: one [`NamingService`] behind the client service
//! listener and the registration listener.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use dfs_rpc::{RpcError, RpcResult, RpcServer, StopGroup};
use dfs_types::{RegistrationSkeleton, RegistrationStub, ServiceSkeleton, ServiceStub};

use crate::config::NamingConfig;
use crate::service::NamingService;

pub struct NamingServer {
    service: Arc<NamingService>,
    clients: RpcServer<ServiceSkeleton<NamingService>>,
    registration: RpcServer<RegistrationSkeleton<NamingService>>,
    stopped: StopGroup,
}

impl NamingServer {
    /// Create a stopped server. Addresses default to ephemeral loopback
    /// ports; production deployments pass the well-known ones.
    pub fn new(
        service_addr: Option<SocketAddr>,
        registration_addr: Option<SocketAddr>,
    ) -> RpcResult<Self> {
        let service = Arc::new(NamingService::new());
        let clients = RpcServer::new(ServiceSkeleton::new(Arc::clone(&service)), service_addr)?;
        let registration = RpcServer::new(
            RegistrationSkeleton::new(Arc::clone(&service)),
            registration_addr,
        )?;

        let stopped = StopGroup::new();
        stopped.join(&clients);
        stopped.join(&registration);

        Ok(Self {
            service,
            clients,
            registration,
            stopped,
        })
    }

    pub fn from_config(config: &NamingConfig) -> RpcResult<Self> {
        Self::new(
            Some(config.service_addr()),
            Some(config.registration_addr()),
        )
    }

    /// The service state, for in-process callers.
    pub fn service(&self) -> &Arc<NamingService> {
        &self.service
    }

    /// Start both listeners. If the second cannot start, the first is
    /// stopped again.
    pub async fn start(&self) -> RpcResult<()> {
        let service_addr = self.clients.start().await?;
        let registration_addr = match self.registration.start().await {
            Ok(addr) => addr,
            Err(e) => {
                self.clients.stop().await;
                self.stopped.reset();
                return Err(e);
            }
        };
        info!(%service_addr, %registration_addr, "naming server started");
        Ok(())
    }

    /// Stop both listeners. Does nothing if they are not running.
    pub async fn stop(&self) {
        self.clients.stop().await;
        self.registration.stop().await;
    }

    /// Install a hook run once both listeners have exited after a start.
    pub fn on_stopped(&self, hook: impl Fn(Option<&RpcError>) + Send + Sync + 'static) {
        self.stopped.on_stopped(hook);
    }

    /// Client stub for the service listener, once its address is known.
    pub fn service_stub(&self) -> RpcResult<ServiceStub> {
        ServiceStub::for_server(&self.clients)
    }

    /// Stub storage nodes register through, once its address is known.
    pub fn registration_stub(&self) -> RpcResult<RegistrationStub> {
        RegistrationStub::for_server(&self.registration)
    }
}

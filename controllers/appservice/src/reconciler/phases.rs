//! Phase orchestration: events, then gateway, then frontend.
//!
//! Each phase builds its descriptors from the AppService and syncs them in
//! a fixed order, stopping at the first failure.

use super::Reconciler;
use crate::descriptors::{database, exposure, workloads};
use crate::error::ControllerError;
use crate::sync::sync_resource;
use cluster_client::ManagedResource;
use crds::AppService;
use kube::ResourceExt;
use tracing::info;

/// The application tiers, in the order they are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Events,
    Gateway,
    Frontend,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Events, Phase::Gateway, Phase::Frontend];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Events => "events",
            Phase::Gateway => "gateway",
            Phase::Frontend => "frontend",
        }
    }
}

impl Reconciler {
    /// Descriptors of `phase`, in sync order.
    pub fn phase_resources(&self, owner: &AppService, phase: Phase) -> Result<Vec<ManagedResource>, ControllerError> {
        let resources = match phase {
            Phase::Events => vec![
                database::credentials_secret(owner)?,
                database::scripts_config_map(owner, &self.scripts)?,
                database::data_claim(owner)?,
                database::database_deployment(owner)?,
                database::database_service(owner)?,
                workloads::events_deployment(owner)?,
                workloads::web_service(owner, workloads::EVENTS_COMPONENT)?,
                exposure::public_exposure(owner, workloads::EVENTS_COMPONENT)?,
            ],
            Phase::Gateway => vec![
                workloads::gateway_deployment(owner)?,
                workloads::web_service(owner, workloads::GATEWAY_COMPONENT)?,
                exposure::public_exposure(owner, workloads::GATEWAY_COMPONENT)?,
            ],
            Phase::Frontend => vec![
                workloads::frontend_deployment(owner)?,
                workloads::web_service(owner, workloads::FRONTEND_COMPONENT)?,
                exposure::public_exposure(owner, workloads::FRONTEND_COMPONENT)?,
            ],
        };
        Ok(resources)
    }

    /// Runs every phase in order.
    pub(crate) async fn run_phases(&self, owner: &AppService) -> Result<(), ControllerError> {
        for phase in Phase::ALL {
            info!(
                "Reconciling {} phase of AppService {}/{}",
                phase.as_str(),
                owner.namespace().unwrap_or_default(),
                owner.name_any()
            );
            for resource in self.phase_resources(owner, phase)? {
                sync_resource(&*self.client, owner, &resource).await?;
            }
        }
        Ok(())
    }
}

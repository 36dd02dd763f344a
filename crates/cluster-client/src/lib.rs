//! Cluster client for the AppService controller
//!
//! Wraps every interaction the controller has with the Kubernetes API:
//! reading and writing `AppService` objects, creating and patching the
//! resources it manages, listing pods, running commands inside them and
//! publishing events.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClientTrait, KubeClusterClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::new(kube::Client::try_default().await?, "appservice-controller", None);
//! let pods = client.list_pods("gramola", "component=events-database").await?;
//! println!("{} database pods", pods.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClusterClient;
pub use error::ClusterError;
pub use models::*;
pub use cluster_trait::ClusterClientTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{ExecCall, MockClusterClient};

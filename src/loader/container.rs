//! Container loading.

use super::{ResourceLoader, RetrievedClosure};
use crate::error::Result;
use crate::schema::{Container, ContainerId, ContainerKind};

/// Maximum number of rounds when following `requires` constraints.
pub const MAX_CONTAINER_ROUNDS: usize = 10;

impl ResourceLoader<ContainerKind> {
    /// Retrieves containers together with the containers they require,
    /// transitively, for at most [`MAX_CONTAINER_ROUNDS`] rounds.
    ///
    /// # Errors
    ///
    /// Returns the transport failure of a retrieve round.
    pub async fn retrieve_with_required(&mut self, ids: &[ContainerId]) -> Result<RetrievedClosure<Container>> {
        self.retrieve_closure(ids, Some(MAX_CONTAINER_ROUNDS), Container::required_containers)
            .await
    }
}

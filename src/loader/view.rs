//! View loading.

use super::ResourceLoader;
use crate::error::Result;
use crate::schema::{View, ViewId, ViewKind};

impl ResourceLoader<ViewKind> {
    /// Retrieves views and, optionally, the views they reach.
    ///
    /// With `include_ancestor`, parents are followed recursively. With
    /// `include_connected`, property sources and edge sources are followed.
    /// Cycles are harmless: every view is visited once.
    ///
    /// # Errors
    ///
    /// Returns the transport failure of a retrieve round.
    pub async fn retrieve_views(
        &mut self,
        ids: &[ViewId],
        include_connected: bool,
        include_ancestor: bool,
    ) -> Result<Vec<View>> {
        let closure = self
            .retrieve_closure(ids, None, |view: &View| {
                view.connected_views(include_connected, include_ancestor)
            })
            .await?;
        Ok(closure.items)
    }
}

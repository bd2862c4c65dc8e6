// Export directory source
//
// Serves playlist-items pages saved from the provider. The first page of a
// collection is `<dir>/<collection_id>.json`; a page's `next` names the
// following page file inside the same directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracklog_kernel::adapters::spotify::PlaylistItemsPage;
use tracklog_kernel::source::{MemberPage, MembershipSource, SourceError};

pub struct ExportDirSource {
    dir: PathBuf,
}

impl ExportDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn page_path(&self, collection_id: &str, cursor: Option<&str>) -> Option<PathBuf> {
        match cursor {
            None => Some(self.dir.join(format!("{collection_id}.json"))),
            // Only the file name is honoured; cursors never leave the directory.
            Some(next) => Path::new(next).file_name().map(|name| self.dir.join(name)),
        }
    }
}

impl MembershipSource for ExportDirSource {
    fn fetch_page(
        &self,
        collection_id: &str,
        cursor: Option<&str>,
    ) -> Result<MemberPage, SourceError> {
        let path = self
            .page_path(collection_id, cursor)
            .ok_or_else(|| SourceError::Malformed {
                collection_id: collection_id.to_string(),
                reason: format!("unusable cursor {cursor:?}"),
            })?;

        let data = fs::read_to_string(&path).map_err(|e| SourceError::Unavailable {
            collection_id: collection_id.to_string(),
            reason: format!("{}: {e}", path.display()),
        })?;

        let page: PlaylistItemsPage =
            serde_json::from_str(&data).map_err(|e| SourceError::Malformed {
                collection_id: collection_id.to_string(),
                reason: format!("{}: {e}", path.display()),
            })?;

        Ok(page.into_member_page())
    }
}

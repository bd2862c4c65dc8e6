// Playlist Items Adapter
//
// Parses one page of the provider's playlist-items response and
// normalizes it into a member page.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::snapshot::{TrackedItem, KEY_SEPARATOR};
use crate::source::MemberPage;

/// Subset of a playlist-items page we care about.
///
/// Ignores markets, images and every audio attribute; only identity
/// and the addition instant matter here.
#[derive(Debug, Deserialize)]
pub struct PlaylistItemsPage {
    pub items: Vec<PlaylistItem>,

    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,

    /// Null for tracks that are no longer available.
    #[serde(default)]
    pub track: Option<Track>,
}

#[derive(Debug, Deserialize)]
pub struct Track {
    pub name: String,

    #[serde(default)]
    pub artists: Vec<Artist>,
}

#[derive(Debug, Deserialize)]
pub struct Artist {
    pub name: String,
}

impl Track {
    /// `"<title> - <first artist>"`.
    pub fn item_key(&self) -> String {
        match self.artists.first() {
            Some(artist) => format!("{}{KEY_SEPARATOR}{}", self.name, artist.name),
            None => self.name.clone(),
        }
    }
}

impl PlaylistItemsPage {
    pub fn into_member_page(self) -> MemberPage {
        let items = self
            .items
            .into_iter()
            .filter_map(|item| {
                let track = item.track?;
                Some(TrackedItem::new(track.item_key(), item.added_at))
            })
            .collect();

        MemberPage {
            items,
            next: self.next,
        }
    }
}

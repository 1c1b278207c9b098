//! Code-review connector contract (spec §6). Implementations live outside
//! this crate; the manager only needs to fetch, address, and mutate
//! changes, and to check merged state.

use crate::model::{Change, ChangeKey};

pub trait SourceConnector {
    /// The connection name this source answers for, matched against a
    /// `Depends-On:` URL's hostname (spec §4.3).
    fn hostname(&self) -> &str;

    fn get_change_by_url(&self, url: &str) -> anyhow::Result<Option<Change>>;

    fn get_change_by_key(&self, key: &ChangeKey) -> anyhow::Result<Option<Change>>;

    fn is_merged(&self, change: &Change, branch: &str) -> anyhow::Result<bool>;

    fn set_change_attributes(&self, key: &ChangeKey, attrs: &[(&str, &str)]) -> anyhow::Result<()>;
}

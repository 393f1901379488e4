//! Resource kinds managed through the reconciler.

pub mod app;
pub mod cluster;
pub mod dhcp;
pub mod filter_zone;
pub mod group;
pub mod permission;
pub mod private_key;
pub mod record;
pub mod record_types;
pub mod session;
pub mod settings;
pub mod user;
pub mod zone;

use serde_json::Value;

use crate::error::AppError;
use crate::technitium::{ApiCall, DnsApi};

pub use app::App;
pub use cluster::{ClusterNode, ClusterRole};
pub use dhcp::DhcpScope;
pub use filter_zone::{FilterList, FilterZone};
pub use group::Group;
pub use permission::Permission;
pub use private_key::PrivateKey;
pub use record::Record;
pub use session::Session;
pub use settings::ServerSettings;
pub use user::User;
pub use zone::Zone;

/// Entries of `response.<array_key>` from a listing endpoint.
pub(crate) async fn list_entries(
    api: &dyn DnsApi,
    call: &ApiCall,
    array_key: &str,
) -> Result<Vec<Value>, AppError> {
    let response = api.call(call).await?.into_result()?;
    Ok(response
        .get(array_key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}

/// Whether a listing endpoint has an entry whose `name_key` equals `name`.
pub(crate) async fn listed(
    api: &dyn DnsApi,
    path: &str,
    array_key: &str,
    name_key: &str,
    name: &str,
) -> Result<bool, AppError> {
    let entries = list_entries(api, &ApiCall::get(path), array_key).await?;
    Ok(entries
        .iter()
        .any(|e| e.get(name_key).and_then(Value::as_str) == Some(name)))
}

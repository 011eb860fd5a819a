pub mod credential;
pub mod device_engagement;
pub mod device_request;

pub use credential::{Credential, IssuerSignedItemBytes, KeyAlias, StoredCredential};
pub use device_engagement::{EngagementDescriptor, EngagementMethod};
pub use device_request::{DisclosureSelection, ItemsRequest, PermittedItems};

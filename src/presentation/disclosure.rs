//! The selective disclosure gate.
//!
//! Nothing leaves the device unless the reader requested it and the holder approved it.
//! [ApprovedItems] can only be produced by [filter_permitted], so the session engine
//! never sees anything but that intersection.
use serde::Serialize;
use std::collections::BTreeMap;

use crate::definitions::device_request::{
    DataElementIdentifier, DocType, IntentToRetain, NameSpace,
};
use crate::definitions::{DisclosureSelection, ItemsRequest};

/// The elements to be returned to the reader, with the reader's intent to retain them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedItems {
    doc_type: DocType,
    #[serde(rename = "nameSpaces")]
    namespaces: BTreeMap<NameSpace, BTreeMap<DataElementIdentifier, IntentToRetain>>,
}

impl ApprovedItems {
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn namespaces(&self) -> &BTreeMap<NameSpace, BTreeMap<DataElementIdentifier, IntentToRetain>> {
        &self.namespaces
    }

    pub fn contains(&self, namespace: &str, element_identifier: &str) -> bool {
        self.namespaces
            .get(namespace)
            .is_some_and(|elements| elements.contains_key(element_identifier))
    }

    /// Iterates over the approved `(namespace, element identifier)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.namespaces.iter().flat_map(|(namespace, elements)| {
            elements
                .keys()
                .map(move |element| (namespace.as_str(), element.as_str()))
        })
    }

    pub fn len(&self) -> usize {
        self.namespaces.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

/// Filter permitted items to only permit the items that were requested.
///
/// Approved elements the reader never asked for are dropped without error,
/// so an over-broad selection can only ever lead to under-disclosure.
pub fn filter_permitted(request: &ItemsRequest, selection: &DisclosureSelection) -> ApprovedItems {
    let mut namespaces: BTreeMap<NameSpace, BTreeMap<DataElementIdentifier, IntentToRetain>> =
        BTreeMap::new();
    let mut excluded = 0usize;

    for (namespace, element_identifier) in selection.approved() {
        match request.intent_to_retain(namespace, element_identifier) {
            Some(intent_to_retain) => {
                namespaces
                    .entry(namespace.to_string())
                    .or_default()
                    .insert(element_identifier.to_string(), intent_to_retain);
            }
            None => excluded += 1,
        }
    }

    if excluded > 0 {
        tracing::debug!(excluded, "dropped approved elements that were not requested");
    }

    ApprovedItems {
        doc_type: request.doc_type.clone(),
        namespaces,
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type DocType = String;
pub type NameSpace = String;
pub type IntentToRetain = bool;
pub type DataElementIdentifier = String;
pub type DataElements = BTreeMap<DataElementIdentifier, IntentToRetain>;
pub type Namespaces = BTreeMap<NameSpace, DataElements>;

/// The items permitted to be shared, grouped by document type and namespace.
pub type PermittedItems = BTreeMap<DocType, BTreeMap<NameSpace, Vec<DataElementIdentifier>>>;

/// The verifier's request for disclosure, as decoded by the session engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsRequest {
    pub doc_type: DocType,
    #[serde(rename = "nameSpaces")]
    pub namespaces: Namespaces,
}

impl ItemsRequest {
    pub fn contains(&self, namespace: &str, element_identifier: &str) -> bool {
        self.intent_to_retain(namespace, element_identifier).is_some()
    }

    /// `None` if the element was not requested.
    pub fn intent_to_retain(&self, namespace: &str, element_identifier: &str) -> Option<bool> {
        self.namespaces
            .get(namespace)
            .and_then(|elements| elements.get(element_identifier))
            .copied()
    }

    /// Number of requested elements across all namespaces.
    pub fn len(&self) -> usize {
        self.namespaces.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The holder's decision on what may be disclosed.
///
/// Entries that were not requested by the verifier have no effect,
/// see [filter_permitted](crate::presentation::disclosure::filter_permitted).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisclosureSelection(BTreeMap<NameSpace, BTreeMap<DataElementIdentifier, bool>>);

impl DisclosureSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        namespace: impl Into<NameSpace>,
        element_identifier: impl Into<DataElementIdentifier>,
        approved: bool,
    ) -> &mut Self {
        self.0
            .entry(namespace.into())
            .or_default()
            .insert(element_identifier.into(), approved);
        self
    }

    pub fn approve(
        &mut self,
        namespace: impl Into<NameSpace>,
        element_identifier: impl Into<DataElementIdentifier>,
    ) -> &mut Self {
        self.set(namespace, element_identifier, true)
    }

    pub fn deny(
        &mut self,
        namespace: impl Into<NameSpace>,
        element_identifier: impl Into<DataElementIdentifier>,
    ) -> &mut Self {
        self.set(namespace, element_identifier, false)
    }

    pub fn is_approved(&self, namespace: &str, element_identifier: &str) -> bool {
        self.0
            .get(namespace)
            .and_then(|elements| elements.get(element_identifier))
            .copied()
            .unwrap_or(false)
    }

    /// Iterates over the approved `(namespace, element identifier)` pairs.
    pub fn approved(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().flat_map(|(namespace, elements)| {
            elements
                .iter()
                .filter(|(_, approved)| **approved)
                .map(move |(element, _)| (namespace.as_str(), element.as_str()))
        })
    }

    /// Builds a selection from the permitted items of a single document type.
    ///
    /// Namespaces listed under any other document type are ignored.
    pub fn from_permitted(doc_type: &str, permitted: PermittedItems) -> Self {
        permitted
            .into_iter()
            .filter(|(permitted_doc_type, _)| permitted_doc_type == doc_type)
            .flat_map(|(_, namespaces)| namespaces)
            .flat_map(|(namespace, elements)| {
                elements
                    .into_iter()
                    .map(move |element| (namespace.clone(), element))
            })
            .collect()
    }
}

impl FromIterator<(NameSpace, DataElementIdentifier)> for DisclosureSelection {
    fn from_iter<I: IntoIterator<Item = (NameSpace, DataElementIdentifier)>>(iter: I) -> Self {
        let mut selection = Self::new();
        for (namespace, element_identifier) in iter {
            selection.approve(namespace, element_identifier);
        }
        selection
    }
}

//! Accessors over a schemaless custom resource.
//!
//! The operator never binds to a generated type for the watched kind: the CR
//! is represented as a [`DynamicObject`], and `spec`/`status` are read and
//! written as raw [`serde_json::Value`] subtrees. This module centralizes
//! that traversal so the rest of the crate never touches `.data` directly.

use kube::core::DynamicObject;
use kube::ResourceExt;
use serde_json::{Map, Value};

/// Finalizer sentinel the operator adds before taking any cluster-affecting
/// action and removes only after a successful uninstall.
pub const FINALIZER: &str = "uninstall-helm-release";

/// The `spec` subtree of a CR, forwarded verbatim as chart values.
pub fn spec_of(cr: &DynamicObject) -> Value {
    cr.data
        .get("spec")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

/// True when `metadata.deletionTimestamp` is set.
pub fn is_deleting(cr: &DynamicObject) -> bool {
    cr.meta().deletion_timestamp.is_some()
}

/// True when the finalizer sentinel is present in `metadata.finalizers`.
pub fn has_finalizer(cr: &DynamicObject) -> bool {
    cr.meta()
        .finalizers
        .as_ref()
        .is_some_and(|fs| fs.iter().any(|f| f == FINALIZER))
}

/// The CR's UID, required for release naming. Missing only for objects that
/// have never round-tripped through the API server (never true for anything
/// the reconciler is handed).
pub fn uid_of(cr: &DynamicObject) -> Option<String> {
    cr.meta().uid.clone()
}

/// `status` subtree, if the operator has previously written one.
pub fn status_of(cr: &DynamicObject) -> Option<Value> {
    cr.data.get("status").cloned()
}

/// Read `status.release` back out of a CR, if present.
pub fn status_release(cr: &DynamicObject) -> Option<Value> {
    status_of(cr).and_then(|s| s.get("release").cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::{ObjectMeta, TypeMeta};
    use serde_json::json;

    fn cr_with(data: Value, finalizers: Option<Vec<String>>) -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta {
                api_version: "example.com/v1alpha1".into(),
                kind: "App".into(),
            }),
            metadata: ObjectMeta {
                name: Some("t1".into()),
                namespace: Some("default".into()),
                uid: Some("1b4e28ba-2fa1-11d2-883f-0016d3cca427".into()),
                finalizers,
                ..Default::default()
            },
            data,
        }
    }

    #[test]
    fn spec_defaults_to_empty_map_when_absent() {
        let cr = cr_with(json!({}), None);
        assert_eq!(spec_of(&cr), json!({}));
    }

    #[test]
    fn spec_is_forwarded_verbatim() {
        let cr = cr_with(json!({"spec": {"replicaCount": 2}}), None);
        assert_eq!(spec_of(&cr), json!({"replicaCount": 2}));
    }

    #[test]
    fn finalizer_detection() {
        let cr = cr_with(json!({}), Some(vec![FINALIZER.to_string()]));
        assert!(has_finalizer(&cr));
        let cr = cr_with(json!({}), Some(vec!["other".to_string()]));
        assert!(!has_finalizer(&cr));
        let cr = cr_with(json!({}), None);
        assert!(!has_finalizer(&cr));
    }
}

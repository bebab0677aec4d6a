//! Manager Factory: produces a [`ReleaseManager`] bound to one CR instance,
//! owning the long-lived dependencies (storage, cluster client, chart path)
//! so each per-CR `Manager` only needs to carry what's specific to it.

use crate::cr;
use crate::error::{Error, Result};
use crate::release::engine::TeraChartEngine;
use crate::release::manager::ReleaseManager;
use crate::release::naming::release_name;
use crate::release::storage::ReleaseStorage;
use crate::status::Status;

use std::path::PathBuf;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::DynamicObject;
use kube::{Client, ResourceExt};

#[derive(Clone)]
pub struct ManagerFactory {
    storage: Arc<dyn ReleaseStorage>,
    client: Client,
    chart_path: PathBuf,
}

impl ManagerFactory {
    pub fn new(storage: Arc<dyn ReleaseStorage>, client: Client, chart_path: PathBuf) -> Self {
        ManagerFactory {
            storage,
            client,
            chart_path,
        }
    }

    /// Build a `ReleaseManager` configured for this CR instance: owner
    /// reference, target namespace, release name, and a deep-copied
    /// snapshot of `spec`.
    pub fn new_manager(&self, cr: &DynamicObject) -> Result<ReleaseManager<TeraChartEngine>> {
        let name = cr.name_any();
        let namespace = cr
            .namespace()
            .ok_or_else(|| Error::MalformedResource(format!("{name} has no namespace")))?;
        let uid = cr::uid_of(cr)
            .ok_or_else(|| Error::MalformedResource(format!("{name} has no uid")))?;
        let values = cr::spec_of(cr);

        let owner_ref = build_owner_ref(cr, &name, &uid)?;

        Ok(ReleaseManager::new(
            self.storage.clone(),
            self.client.clone(),
            self.chart_path.clone(),
            values,
            release_name(&name, &uid),
            namespace,
            TeraChartEngine::new(),
            owner_ref,
        ))
    }

    /// Initial status for a CR the reconciler has just attached a finalizer
    /// to.
    pub fn initial_status(&self) -> Status {
        Status::default()
    }
}

fn build_owner_ref(cr: &DynamicObject, name: &str, uid: &str) -> Result<OwnerReference> {
    let types = cr
        .types
        .as_ref()
        .ok_or_else(|| Error::MalformedResource(format!("{name} is missing apiVersion/kind")))?;
    Ok(OwnerReference {
        api_version: types.api_version.clone(),
        kind: types.kind.clone(),
        name: name.to_string(),
        uid: uid.to_string(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::storage::InMemoryReleaseStorage;
    use kube::core::{ObjectMeta, TypeMeta};
    use serde_json::json;

    fn offline_client() -> Client {
        let (mock_service, _handle) =
            tower_test::mock::pair::<http::Request<kube::client::Body>, http::Response<kube::client::Body>>();
        Client::new(mock_service, "default")
    }

    fn cr(uid: &str) -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta {
                api_version: "apache.org/v1alpha1".into(),
                kind: "Tomcat".into(),
            }),
            metadata: ObjectMeta {
                name: Some("t1".into()),
                namespace: Some("default".into()),
                uid: Some(uid.into()),
                ..Default::default()
            },
            data: json!({"spec": {"replicaCount": 2}}),
        }
    }

    #[test]
    fn release_naming_is_stable_across_factory_calls() {
        let factory = ManagerFactory::new(
            Arc::new(InMemoryReleaseStorage::new()),
            offline_client(),
            PathBuf::from("/tmp"),
        );
        let cr = cr("1b4e28ba-2fa1-11d2-883f-0016d3cca427");
        let mgr1 = factory.new_manager(&cr).unwrap();
        let mgr2 = factory.new_manager(&cr).unwrap();
        assert_eq!(
            format!("{:?}", mgr1.decide()),
            format!("{:?}", mgr2.decide())
        );
    }

    #[test]
    fn rejects_cr_without_namespace() {
        let factory = ManagerFactory::new(
            Arc::new(InMemoryReleaseStorage::new()),
            offline_client(),
            PathBuf::from("/tmp"),
        );
        let mut cr = cr("1b4e28ba-2fa1-11d2-883f-0016d3cca427");
        cr.metadata.namespace = None;
        assert!(factory.new_manager(&cr).is_err());
    }
}

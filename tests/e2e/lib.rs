#[cfg(all(test, feature = "e2e-tests"))]
mod test {
    //! Runs against a live cluster with the operator deployed, watching an
    //! `E2eRelease` CR backed by a chart that renders a single `ConfigMap`.
    //! Assumes `HELM_CHART_WATCHES` wires `e2e.chart-operator.example.com/v1alpha1`
    //! `E2eRelease` to that chart.

    use std::time::Duration;

    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::{Api, Patch, PatchParams, PostParams};
    use kube::client::Client;
    use kube::core::{DynamicObject, ObjectMeta, TypeMeta};
    use kube::discovery::ApiResource;
    use kube::runtime::wait::{await_condition, conditions, Condition};
    use kube::ResourceExt;
    use serde_json::json;
    use tokio::time::timeout;

    const GROUP: &str = "e2e.chart-operator.example.com";
    const VERSION: &str = "v1alpha1";
    const KIND: &str = "E2eRelease";

    fn release_api_resource() -> ApiResource {
        ApiResource {
            group: GROUP.to_string(),
            version: VERSION.to_string(),
            api_version: format!("{GROUP}/{VERSION}"),
            kind: KIND.to_string(),
            plural: "e2ereleases".to_string(),
        }
    }

    fn is_release_applied() -> impl Condition<DynamicObject> {
        |obj: Option<&DynamicObject>| {
            obj.and_then(|o| o.data.pointer("/status/phase"))
                .and_then(|p| p.as_str())
                == Some("Applied")
        }
    }

    fn is_release_failed() -> impl Condition<DynamicObject> {
        |obj: Option<&DynamicObject>| {
            obj.and_then(|o| o.data.pointer("/status/phase"))
                .and_then(|p| p.as_str())
                == Some("Failed")
        }
    }

    async fn wait_for<R, C>(api: Api<R>, name: &str, condition: C)
    where
        R: kube::Resource
            + Clone
            + std::fmt::Debug
            + for<'de> k8s_openapi::serde::Deserialize<'de>
            + 'static
            + Send,
        C: Condition<R>,
    {
        timeout(
            Duration::from_secs(30),
            await_condition(api, name, condition),
        )
        .await
        .unwrap()
        .unwrap();
    }

    fn release(name: &str, replica_count: i64) -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta {
                api_version: format!("{GROUP}/{VERSION}"),
                kind: KIND.to_string(),
            }),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            data: json!({ "spec": { "name": name, "replicaCount": replica_count } }),
        }
    }

    async fn setup(name: &str) -> (Api<DynamicObject>, Api<ConfigMap>) {
        let client = Client::try_default().await.unwrap();
        let ar = release_api_resource();
        let release_api: Api<DynamicObject> = Api::namespaced_with(client.clone(), "default", &ar);
        let configmap_api = Api::<ConfigMap>::namespaced(client, "default");

        release_api
            .create(&PostParams::default(), &release(name, 1))
            .await
            .unwrap();

        wait_for(release_api.clone(), name, is_release_applied()).await;
        (release_api, configmap_api)
    }

    #[tokio::test]
    async fn install_creates_owned_configmap() {
        let name = "test-install";
        let (_release_api, configmap_api) = setup(name).await;

        let cm = configmap_api.get(name).await.unwrap();
        assert!(cm
            .owner_references()
            .iter()
            .any(|o| o.kind == KIND && o.name == name));
    }

    #[tokio::test]
    async fn update_rerenders_configmap() {
        let name = "test-update";
        let (release_api, configmap_api) = setup(name).await;

        let mut release = release_api.get(name).await.unwrap();
        release.data["spec"]["replicaCount"] = json!(3);
        release.metadata.managed_fields = None;
        release_api
            .patch(
                name,
                &PatchParams::apply("e2e-tests").force(),
                &Patch::Apply(&release),
            )
            .await
            .unwrap();

        wait_for(release_api.clone(), name, is_release_applied()).await;

        let cm = configmap_api.get(name).await.unwrap();
        assert_eq!(cm.data.as_ref().unwrap().get("replicaCount").unwrap(), "3");
    }

    #[tokio::test]
    async fn delete_removes_owned_configmap() {
        let name = "test-delete";
        let (release_api, configmap_api) = setup(name).await;

        let cm = configmap_api.get(name).await.unwrap();
        release_api.delete(name, &Default::default()).await.unwrap();

        wait_for(release_api, name, conditions::is_deleted(&cm.uid().unwrap())).await;
    }

    #[tokio::test]
    async fn drift_repair_restores_deleted_resource() {
        let name = "test-drift-repair";
        let (_release_api, configmap_api) = setup(name).await;

        let cm = configmap_api.get(name).await.unwrap();
        configmap_api
            .delete(name, &Default::default())
            .await
            .unwrap();

        wait_for(
            configmap_api.clone(),
            name,
            conditions::is_deleted(&cm.uid().unwrap()),
        )
        .await;

        // the periodic reconcile re-applies the deployed manifest without a
        // new release version
        wait_for(configmap_api, name, |obj: Option<&ConfigMap>| obj.is_some()).await;
    }

    // exercises the Failed phase transition: a negative replica count
    // intentionally fails template rendering in the e2e chart's guard.
    #[tokio::test]
    async fn invalid_spec_surfaces_failed_phase() {
        let name = "test-invalid-spec";
        let client = Client::try_default().await.unwrap();
        let ar = release_api_resource();
        let release_api: Api<DynamicObject> = Api::namespaced_with(client, "default", &ar);

        release_api
            .create(&PostParams::default(), &release(name, -1))
            .await
            .unwrap();

        wait_for(release_api, name, is_release_failed()).await;
    }
}

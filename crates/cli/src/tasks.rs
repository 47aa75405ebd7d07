//! One task per invocation: validate, reconcile, report.

use compute::{
    client::ComputeClient,
    instance::{InstanceDescriptor, InstanceGateway},
    project::instance_info,
};
use converge::{DesiredState, Error, Result, engine};
use kube_resources::{
    namespace::{NamespaceDescriptor, NamespaceGateway, namespace_info},
    pod::{PodGateway, pod_info},
    replication_controller::{ReplicationControllerGateway, replication_controller_info},
    service::{ServiceGateway, service_info},
};
use serde_json::{Value, json};

use crate::params::{
    InstanceArgs, NamespaceArgs, PodArgs, ReplicationControllerArgs, ServiceArgs, Target,
};

pub async fn instance(args: InstanceArgs) -> Result<Value> {
    let task = args.validate()?;
    let client = ComputeClient::new(task.config)?;
    let zone = client.get_zone(&task.params.zone).await?;

    // References only need resolving when something may be created.
    let descriptor = match task.state {
        DesiredState::Present => InstanceDescriptor::resolve(&client, &zone, &task.params).await?,
        DesiredState::Absent => InstanceDescriptor::default(),
    };
    let gateway = InstanceGateway::new(&client, zone.name.clone());

    let report = match (&task.target, task.state) {
        (Target::One(name), DesiredState::Present) => {
            let outcome = engine::reconcile(&gateway, task.state, name, &descriptor).await?;
            let data: Vec<_> = outcome.resource.iter().map(instance_info).collect();
            json!({
                "state": task.state_label,
                "changed": outcome.changed,
                "zone": zone.name,
                "name": name,
                "instance_data": data,
            })
        }
        (Target::One(name), DesiredState::Absent) => {
            let outcome = engine::reconcile(&gateway, task.state, name, &descriptor).await?;
            json!({
                "state": task.state_label,
                "changed": outcome.changed,
                "zone": zone.name,
                "name": name,
            })
        }
        (Target::Many(names), DesiredState::Present) => {
            let batch = engine::reconcile_all(&gateway, task.state, names, &descriptor).await?;
            let data: Vec<_> = batch
                .outcomes
                .iter()
                .filter_map(|o| o.resource.as_ref())
                .map(instance_info)
                .collect();
            json!({
                "state": task.state_label,
                "changed": batch.changed,
                "zone": zone.name,
                "instance_names": batch.names,
                "instance_data": data,
            })
        }
        (Target::Many(names), DesiredState::Absent) => {
            let batch = engine::reconcile_all(&gateway, task.state, names, &descriptor).await?;
            // Only names that were actually deleted are reported back.
            let deleted: Vec<_> = batch
                .names
                .iter()
                .zip(&batch.outcomes)
                .filter(|(_, o)| o.changed)
                .map(|(n, _)| n.clone())
                .collect();
            json!({
                "state": task.state_label,
                "changed": batch.changed,
                "zone": zone.name,
                "instance_names": deleted,
            })
        }
    };
    Ok(report)
}

pub async fn namespace(args: NamespaceArgs) -> Result<Value> {
    let task = args.validate()?;
    let gateway = NamespaceGateway::new(cluster_client().await?);
    let outcome = engine::reconcile(&gateway, task.state, &task.name, &NamespaceDescriptor).await?;
    Ok(match outcome.resource {
        Some(ns) => json!({
            "changed": outcome.changed,
            "name": task.name,
            "result": namespace_info(&ns),
        }),
        None => json!({"changed": outcome.changed, "name": task.name}),
    })
}

pub async fn pod(args: PodArgs) -> Result<Value> {
    let task = args.validate()?;
    let gateway = PodGateway::new(cluster_client().await?, &task.namespace);
    let outcome = engine::reconcile(&gateway, task.state, &task.name, &task.descriptor).await?;
    Ok(match outcome.resource {
        Some(pod) => json!({
            "changed": outcome.changed,
            "name": task.name,
            "namespace": task.namespace,
            "labels": task.descriptor.labels,
            "result": pod_info(&pod),
        }),
        None => json!({
            "changed": outcome.changed,
            "name": task.name,
            "namespace": task.namespace,
        }),
    })
}

pub async fn replication_controller(args: ReplicationControllerArgs) -> Result<Value> {
    let task = args.validate()?;
    let gateway = ReplicationControllerGateway::new(cluster_client().await?, &task.namespace);
    let outcome = engine::reconcile(&gateway, task.state, &task.name, &task.descriptor).await?;
    Ok(match outcome.resource {
        Some(rc) => json!({
            "changed": outcome.changed,
            "name": task.name,
            "namespace": task.namespace,
            "replicas": task.descriptor.replicas,
            "selector": task.descriptor.selector,
            "result": replication_controller_info(&rc),
        }),
        None => json!({
            "changed": outcome.changed,
            "name": task.name,
            "namespace": task.namespace,
        }),
    })
}

pub async fn service(args: ServiceArgs) -> Result<Value> {
    let task = args.validate()?;
    let gateway = ServiceGateway::new(cluster_client().await?, &task.namespace);
    let outcome = engine::reconcile(&gateway, task.state, &task.name, &task.descriptor).await?;
    Ok(match outcome.resource {
        Some(service) => json!({
            "changed": outcome.changed,
            "name": task.name,
            "namespace": task.namespace,
            "result": service_info(&service),
        }),
        None => json!({
            "changed": outcome.changed,
            "name": task.name,
            "namespace": task.namespace,
        }),
    })
}

async fn cluster_client() -> Result<kube::Client> {
    kube::Client::try_default()
        .await
        .map_err(|e| Error::Transport(e.to_string()))
}

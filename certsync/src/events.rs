//! Publishes events about synchronized certificates
#[cfg(test)]
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::{
    runtime::events::{Event, EventType, Recorder, Reporter},
    Client,
};
use tracing::{info, warn};

use crate::resource::ResourceKind;

/// Why an event was emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reason {
    /// The files of a resource were rewritten with new content.
    CertificateUpdated,
    /// An optional resource disappeared and its directory was removed.
    CertificateRemoved,
    /// Fetching or writing a resource failed.
    CertificateUpdateFailed,
}

impl Reason {
    /// The machine-readable reason string
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CertificateUpdated => "CertificateUpdated",
            Self::CertificateRemoved => "CertificateRemoved",
            Self::CertificateUpdateFailed => "CertificateUpdateFailed",
        }
    }

    /// Failures are warnings, everything else is normal.
    pub fn event_type(self) -> EventType {
        match self {
            Self::CertificateUpdateFailed => EventType::Warning,
            Self::CertificateUpdated | Self::CertificateRemoved => EventType::Normal,
        }
    }

    fn action(self) -> &'static str {
        match self {
            Self::CertificateRemoved => "Remove",
            Self::CertificateUpdated | Self::CertificateUpdateFailed => "Sync",
        }
    }
}

/// An event about one mirrored resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertEvent {
    /// Why the event was emitted
    pub reason: Reason,
    /// Kind of the affected resource
    pub kind: ResourceKind,
    /// Name of the affected resource
    pub name: String,
    /// Human-readable description
    pub note: String,
}

impl CertEvent {
    pub(crate) fn updated(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            reason: Reason::CertificateUpdated,
            kind,
            name: name.to_string(),
            note: format!("Wrote updated {kind}: {namespace}/{name}"),
        }
    }

    pub(crate) fn removed(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            reason: Reason::CertificateRemoved,
            kind,
            name: name.to_string(),
            note: format!("Removed files for {kind}: {namespace}/{name}"),
        }
    }

    pub(crate) fn update_failed(
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        err: &dyn std::error::Error,
    ) -> Self {
        Self {
            reason: Reason::CertificateUpdateFailed,
            kind,
            name: name.to_string(),
            note: format!("Failed writing files for {kind}: {namespace}/{name}: {err}"),
        }
    }

    /// The `events.k8s.io` representation, without a secondary object
    pub fn to_event(&self) -> Event {
        Event {
            type_: self.reason.event_type(),
            reason: self.reason.as_str().into(),
            note: Some(self.note.clone()),
            action: self.reason.action().into(),
            secondary: None,
        }
    }
}

/// Receiver of [`CertEvent`]s.
///
/// Publishing is best effort: a sink that cannot deliver an event logs the failure instead of
/// failing the sync that produced it.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver `event`
    async fn publish(&self, event: CertEvent);
}

/// A reference to the Pod `namespace/name`, suitable as the subject of published events.
pub fn pod_reference(namespace: &str, name: &str) -> ObjectReference {
    ObjectReference {
        api_version: Some("v1".into()),
        kind: Some("Pod".into()),
        namespace: Some(namespace.into()),
        name: Some(name.into()),
        ..ObjectReference::default()
    }
}

/// Publishes [`CertEvent`]s as `events.k8s.io/v1` Events through kube's [`Recorder`].
///
/// All events regard the [`ObjectReference`] given to [`EventRecorder::new`], normally the
/// pod the certificates are synchronized for, so they show up in `kubectl describe` for it.
/// Repeats of the same event are folded into an event series by the [`Recorder`].
///
/// The controller needs `create` and `patch` on `events.k8s.io/events` in the namespace of the
/// referenced object.
pub struct EventRecorder {
    recorder: Recorder,
    reference: ObjectReference,
}

impl EventRecorder {
    /// Build a recorder reporting as `reporter`, with events attached to `reference`.
    ///
    /// `reporter.instance` is typically the controller's pod name, injected through the
    /// downward API.
    #[must_use]
    pub fn new(client: Client, reporter: Reporter, reference: ObjectReference) -> Self {
        Self {
            recorder: Recorder::new(client, reporter),
            reference,
        }
    }

    /// Publish `ev` regarding the configured object.
    ///
    /// # Errors
    ///
    /// Returns a [`kube::Error`] if the event is rejected by Kubernetes.
    pub async fn create(&self, ev: &CertEvent) -> Result<(), kube::Error> {
        self.recorder.publish(&ev.to_event(), &self.reference).await
    }
}

#[async_trait]
impl EventSink for EventRecorder {
    async fn publish(&self, event: CertEvent) {
        if let Err(err) = self.create(&event).await {
            warn!(reason = event.reason.as_str(), name = %event.name, %err, "failed to publish event");
        }
    }
}

/// Writes events to the log only, for running without a pod to attach them to.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl EventSink for LoggingSink {
    async fn publish(&self, event: CertEvent) {
        match event.reason.event_type() {
            EventType::Normal => info!(reason = event.reason.as_str(), "{}", event.note),
            EventType::Warning => warn!(reason = event.reason.as_str(), "{}", event.note),
        }
    }
}

/// Keeps published events in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<CertEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    /// Everything published so far, oldest first
    pub(crate) fn events(&self) -> Vec<CertEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Reasons of everything published so far, oldest first
    pub(crate) fn reasons(&self) -> Vec<Reason> {
        self.events().into_iter().map(|e| e.reason).collect()
    }

    /// Forget all recorded events
    pub(crate) fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

#[cfg(test)]
#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: CertEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_warnings() {
        assert_eq!(Reason::CertificateUpdateFailed.event_type(), EventType::Warning);
        assert_eq!(Reason::CertificateUpdated.event_type(), EventType::Normal);
        assert_eq!(Reason::CertificateRemoved.event_type(), EventType::Normal);
    }

    #[test]
    fn notes_name_the_resource() {
        let ev = CertEvent::updated(ResourceKind::Secret, "openshift-kube-apiserver", "serving-cert");
        assert_eq!(ev.note, "Wrote updated secret: openshift-kube-apiserver/serving-cert");
        assert_eq!(ev.name, "serving-cert");

        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let ev = CertEvent::update_failed(ResourceKind::ConfigMap, "ns", "ca", &err);
        assert!(ev.note.ends_with("ns/ca: disk full"), "{}", ev.note);
    }

    #[test]
    fn removals_map_to_remove_action() {
        let ev = CertEvent::removed(ResourceKind::ConfigMap, "ns", "ca").to_event();
        assert_eq!(ev.type_, EventType::Normal);
        assert_eq!(ev.reason, "CertificateRemoved");
        assert_eq!(ev.action, "Remove");
        assert_eq!(ev.note.as_deref(), Some("Removed files for configmap: ns/ca"));
        assert!(ev.secondary.is_none());

        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let ev = CertEvent::update_failed(ResourceKind::Secret, "ns", "tls", &err).to_event();
        assert_eq!(ev.type_, EventType::Warning);
        assert_eq!(ev.action, "Sync");
    }

    #[tokio::test]
    async fn recording_sink_keeps_order() {
        let sink = RecordingSink::default();
        sink.publish(CertEvent::updated(ResourceKind::Secret, "ns", "a")).await;
        sink.publish(CertEvent::removed(ResourceKind::Secret, "ns", "a")).await;
        assert_eq!(sink.reasons(), vec![Reason::CertificateUpdated, Reason::CertificateRemoved]);
        sink.clear();
        assert!(sink.events().is_empty());
    }
}

#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex},
};

use ferry_fatal::callback::{CallbackError, CallbackTransport, HttpCallback};
use rootcause::Report;
use tracing::{
    Dispatch, Event, Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{
    Registry,
    layer::{Context, Layer, SubscriberExt},
};

/// One log record seen by [`LogCapture`].
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Tracing layer that keeps every event in memory.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<CapturedEvent>>>);

impl LogCapture {
    /// A dispatcher routing events into a fresh capture.
    ///
    /// The dispatcher has to be entered on every thread that should be
    /// captured, see [`tracing::dispatcher::with_default`].
    pub fn dispatch() -> (Self, Dispatch) {
        let capture = Self::default();
        let dispatch = Dispatch::new(Registry::default().with(capture.clone()));
        (capture, dispatch)
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.message == message)
            .collect()
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_owned();
        } else {
            self.fields.insert(field.name().to_owned(), value.to_owned());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .insert(field.name().to_owned(), format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.0.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

/// Transport recording every delivery attempt.
#[derive(Clone, Default)]
pub struct SpyTransport {
    posted: Arc<Mutex<Vec<HttpCallback>>>,
    fail: bool,
}

impl SpyTransport {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn posted(&self) -> Vec<HttpCallback> {
        self.posted.lock().unwrap().clone()
    }
}

impl CallbackTransport for SpyTransport {
    fn post(&self, callback: &HttpCallback) -> Result<(), Report<CallbackError>> {
        self.posted.lock().unwrap().push(callback.clone());
        if self.fail {
            Err(Report::new(CallbackError::Connect {
                uri: callback.uri.clone(),
                reason: "connection refused".to_owned(),
            }))
        } else {
            Ok(())
        }
    }
}

pub const STATE_JSON: &str = r#"{"LastSuccessfulPrimaryKeys":{"db.users":1042}}"#;

pub fn state_ok() -> impl Fn() -> Result<String, Report> + Send + Sync + 'static {
    || -> Result<String, Report> { Ok(STATE_JSON.to_owned()) }
}

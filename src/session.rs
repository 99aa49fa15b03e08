use std::sync::Arc;

use futures::{
  future::BoxFuture,
  stream::{FuturesUnordered, StreamExt},
  FutureExt,
};
use tokio::sync::{mpsc, oneshot};

use crate::{
  config::WatchConfig,
  dispatch::{Completion, Dispatcher, Notification, Operation, Step},
  models::{PeripheralId, ServiceDescriptor, ServiceEvent, SessionView},
  transport::{DiscoveryTransport, PresentationSink},
  Error, Result,
};

enum SessionCommand {
  Pick(Option<PeripheralId>),
  Select(Option<ServiceDescriptor>),
  View(oneshot::Sender<SessionView>),
}

/// Cloneable entry point for user input into a running [`Session`].
#[derive(Clone)]
pub struct SessionHandle {
  commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
  /// Picks a device from the list; `None` is the empty placeholder entry.
  pub fn pick_peripheral(&self, peripheral: Option<PeripheralId>) -> Result<()> {
    self.send(SessionCommand::Pick(peripheral))
  }

  pub fn select_service(&self, service: Option<ServiceDescriptor>) -> Result<()> {
    self.send(SessionCommand::Select(service))
  }

  pub async fn view(&self) -> Result<SessionView> {
    let (tx, rx) = oneshot::channel();
    self.send(SessionCommand::View(tx))?;
    rx.await.map_err(|_| Error::SessionClosed)
  }

  fn send(&self, command: SessionCommand) -> Result<()> {
    self.commands.send(command).map_err(|_| Error::SessionClosed)
  }
}

/// Drives a [`Dispatcher`] from one task: service events, user commands and
/// transport results are applied one at a time, in arrival order.
pub struct Session {
  dispatcher: Dispatcher,
  transport: Arc<dyn DiscoveryTransport>,
  sink: Box<dyn PresentationSink>,
  commands: mpsc::UnboundedReceiver<SessionCommand>,
  pending: FuturesUnordered<BoxFuture<'static, Completion>>,
}

impl Session {
  pub fn new(
    config: WatchConfig,
    transport: Arc<dyn DiscoveryTransport>,
    sink: Box<dyn PresentationSink>,
  ) -> (Self, SessionHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = Self {
      dispatcher: Dispatcher::new(config),
      transport,
      sink,
      commands: rx,
      pending: FuturesUnordered::new(),
    };
    (session, SessionHandle { commands: tx })
  }

  /// Runs until every [`SessionHandle`] is dropped.
  pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ServiceEvent>) {
    log::info!("Device info session started");
    self.sink.on_selection_cleared();
    let step = self.dispatcher.start();
    self.apply(step);

    let mut events_open = true;
    loop {
      tokio::select! {
        Some(completion) = self.pending.next(), if !self.pending.is_empty() => {
          let step = self.dispatcher.complete(completion);
          self.apply(step);
        }
        event = events.recv(), if events_open => match event {
          Some(event) => {
            log::debug!("Service event | event={event:?}");
            let step = self.dispatcher.handle_event(event);
            self.apply(step);
          }
          None => {
            log::warn!("Service event stream closed");
            events_open = false;
          }
        },
        command = self.commands.recv() => match command {
          Some(SessionCommand::Pick(peripheral)) => {
            let step = self.dispatcher.pick_peripheral(peripheral);
            self.apply(step);
          }
          Some(SessionCommand::Select(service)) => {
            let step = self.dispatcher.select_service(service);
            self.apply(step);
          }
          Some(SessionCommand::View(reply)) => {
            let _ = reply.send(self.dispatcher.view());
          }
          None => break,
        },
      }
    }
    log::info!("Device info session stopped");
  }

  fn apply(&mut self, step: Step) {
    for notification in &step.notifications {
      match notification {
        Notification::DirectoryChanged(devices) => self.sink.on_directory_changed(devices),
        Notification::SelectionCleared => self.sink.on_selection_cleared(),
        Notification::ServiceSelected(service) => self.sink.on_service_selected(service),
        Notification::AttributeValueChanged(value) => self.sink.on_attribute_value_changed(value),
      }
    }
    for operation in step.operations {
      self.pending.push(start_operation(self.transport.as_ref(), operation));
    }
  }
}

fn start_operation(transport: &dyn DiscoveryTransport, operation: Operation) -> BoxFuture<'static, Completion> {
  match operation {
    Operation::ListPeripherals => transport.list_peripherals().map(Completion::PeripheralsListed).boxed(),
    Operation::ListServices { peripheral, purpose } => transport
      .list_services(&peripheral)
      .map(move |result| Completion::ServicesListed {
        peripheral,
        purpose,
        result,
      })
      .boxed(),
    Operation::ResolvePeripheral(peripheral) => transport
      .peripheral(&peripheral)
      .map(move |result| Completion::PeripheralResolved { peripheral, result })
      .boxed(),
    Operation::ListAttributes(service) => transport
      .list_attributes(&service)
      .map(move |result| Completion::AttributesListed {
        service: service.handle,
        result,
      })
      .boxed(),
    Operation::ReadAttribute {
      service,
      kind,
      attribute,
    } => transport
      .read_attribute(&attribute)
      .map(move |result| Completion::AttributeRead {
        service,
        kind,
        attribute,
        result,
      })
      .boxed(),
  }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use log::{debug, error, info, trace, warn};

use crate::artifact::{self, ClipboardSink, JsonArtifact};
use crate::client::GenerationTransport;
use crate::request::GenerationRequest;
use crate::{ControllerFoot, GenerationResult, Prompt};

const TICK: Duration = Duration::from_secs(1);

/// What the prompt form is doing
#[derive(Debug, Clone, PartialEq)]
pub enum UiState
{   Idle
  , Submitting
  , Cooldown { remaining_secs: u32 }
  , Displaying(GenerationResult)
}

/// Everything a renderer needs
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot
{   pub ui: UiState
  , /// Last result; stays visible through the cooldown
    pub result: Option<GenerationResult>
  , /// Inline message under the prompt box
    pub validation_error: Option<String>
  , pub copied: bool
  , pub downloaded: bool
}

impl ControllerSnapshot
{   fn initial() -> Self
    {   ControllerSnapshot
        {   ui: UiState::Idle
          , result: None
          , validation_error: None
          , copied: false
          , downloaded: false
        }
    }

    /// Whether the submit affordance is enabled
    pub fn can_submit(&self) -> bool
    {   match self.ui
        {   UiState::Idle | UiState::Displaying(_) => true
          , UiState::Cooldown { remaining_secs } => remaining_secs == 0
          , UiState::Submitting => false
        }
    }

    /// Formatted success payload, if any
    pub fn display_text(&self) -> Option<String>
    {   artifact::display_text(self.result.as_ref())
    }
}

/// Pure transition logic
#[derive(Debug, Clone)]
pub struct ControllerState
{   snapshot: ControllerSnapshot
  , cooldown_secs: u32
}

impl ControllerState
{   pub fn new(cooldown_secs: u32) -> Self
    {   ControllerState
        {   snapshot: ControllerSnapshot::initial()
          , cooldown_secs
        }
    }

    pub fn snapshot(&self) -> &ControllerSnapshot
    {   &self.snapshot
    }

    /// Try to enter `Submitting`. A blank prompt only sets the inline
    /// message; busy and cooldown rejections change nothing.
    pub fn begin_submit(
      &mut self
    , input: &str
    ) -> Result<Prompt, crate::error::Error>
    {   match self.snapshot.ui
        {   UiState::Submitting => {
              return Err(crate::error::Error::Busy);
            }
          , UiState::Cooldown { remaining_secs } if remaining_secs > 0 => {
              return Err(crate::error::Error::CoolingDown(remaining_secs));
            }
          , _ => {}
        }

        let prompt = match Prompt::parse(input)
        {   Ok(p) => p
          , Err(e) => {
              self.snapshot.validation_error = Some(e.to_string());
              return Err(e);
            }
        };

        self.snapshot = ControllerSnapshot
        {   ui: UiState::Submitting
          , ..ControllerSnapshot::initial()
        };
        Ok(prompt)
    }

    /// Record the outcome of the in-flight request.
    /// Returns true when it was a success.
    pub fn finish(&mut self, result: GenerationResult) -> bool
    {   if self.snapshot.ui != UiState::Submitting
        {   warn!("Dropping result that arrived outside Submitting");
            return false;
        }
        let success = result.is_success();
        self.snapshot.result = Some(result.clone());
        self.snapshot.ui = UiState::Displaying(result);
        success
    }

    /// `Displaying(Success)` to `Cooldown(N)`.
    /// Returns true when a cooldown is now running.
    pub fn start_cooldown(&mut self) -> bool
    {   if !matches!(
          self.snapshot.ui
        , UiState::Displaying(GenerationResult::Success(_))
        )
        {   return false;
        }
        if self.cooldown_secs == 0
        {   self.snapshot.ui = UiState::Idle;
            return false;
        }
        self.snapshot.ui = UiState::Cooldown
        {   remaining_secs: self.cooldown_secs
        };
        true
    }

    /// One second of cooldown. Reaching zero lands in `Idle`.
    /// Returns true while the cooldown is still running.
    pub fn tick(&mut self) -> bool
    {   match self.snapshot.ui
        {   UiState::Cooldown { remaining_secs } => {
              let remaining = remaining_secs.saturating_sub(1);
              if remaining == 0
              {   self.snapshot.ui = UiState::Idle;
                  false
              } else
              {   self.snapshot.ui = UiState::Cooldown
                  {   remaining_secs: remaining
                  };
                  true
              }
            }
          , _ => false
        }
    }

    pub fn set_copied(&mut self, copied: bool)
    {   self.snapshot.copied = copied;
    }

    pub fn set_downloaded(&mut self, downloaded: bool)
    {   self.snapshot.downloaded = downloaded;
    }
}

/// Child task owned by the controller, aborted when dropped
struct ScheduledTask
{   epoch: u64
  , handle: JoinHandle<()>
}

impl Drop for ScheduledTask
{   fn drop(&mut self)
    {   self.handle.abort();
    }
}

fn is_current(slot: &Option<ScheduledTask>, epoch: u64) -> bool
{   slot.as_ref().map(|t| t.epoch == epoch).unwrap_or(false)
}

/// Reports from child tasks
enum Event
{   Finished { epoch: u64, result: GenerationResult }
  , CooldownTick { epoch: u64 }
  , CopiedExpired { epoch: u64 }
  , DownloadedExpired { epoch: u64 }
  , Saved
    {   epoch: u64
      , saved: crate::DownloadReply
      , reply: crate::DownloadReplySender
    }
}

/// State owned by the controller task
struct ControllerTask
{   state: ControllerState
  , transport: Arc<dyn GenerationTransport>
  , clipboard: Box<dyn ClipboardSink>
  , snapshot_tx: watch::Sender<ControllerSnapshot>
  , events_tx: mpsc::UnboundedSender<Event>
  , flash: Duration
  , download_name: String
  , staging_dir: PathBuf
  , next_epoch: u64
  , request: Option<ScheduledTask>
  , cooldown: Option<ScheduledTask>
  , copied: Option<ScheduledTask>
  , downloaded: Option<ScheduledTask>
  , saving: Option<ScheduledTask>
}

impl ControllerTask
{   fn publish(&self)
    {   trace!("Publishing {:?}", self.state.snapshot().ui);
        self.snapshot_tx.send_replace(self.state.snapshot().clone());
    }

    fn epoch(&mut self) -> u64
    {   self.next_epoch += 1;
        self.next_epoch
    }

    fn handle_submit(&mut self, input: String) -> crate::SubmitReply
    {   let prompt = match self.state.begin_submit(&input)
        {   Ok(p) => p
          , Err(e) => {
              debug!("Submit rejected: {}", e);
              self.publish();
              return Err(e);
            }
        };

        self.cooldown = None;
        self.copied = None;
        self.downloaded = None;

        let epoch = self.epoch();
        let transport = self.transport.clone();
        let events = self.events_tx.clone();
        let request = GenerationRequest::new(&prompt);
        info!("Submitting a {}-byte prompt", prompt.as_str().len());
        let handle = tokio::spawn(async move {
          let result = transport.request(request).await;
          let _ = events.send(Event::Finished { epoch, result });
        });
        self.request = Some(ScheduledTask { epoch, handle });
        self.publish();
        Ok(())
    }

    fn handle_copy(&mut self) -> crate::CopyReply
    {   let text = match self.state.snapshot().display_text()
        {   Some(t) => t
          , None => {
              debug!("Nothing to copy");
              return Ok(false);
            }
        };
        self.clipboard.set_text(&text)?;
        self.state.set_copied(true);
        let epoch = self.epoch();
        self.copied = Some(self.flash_task(
          epoch
        , Event::CopiedExpired { epoch }
        ));
        self.publish();
        Ok(true)
    }

    /// Save the formatted result off the loop. The outcome comes back as
    /// `Event::Saved`, which answers `reply`.
    fn handle_download(
      &mut self
    , mut target: Box<dyn artifact::SaveTarget>
    , reply: crate::DownloadReplySender
    )
    {   let text = match self.state.snapshot().display_text()
        {   Some(t) => t
          , None => {
              debug!("Nothing to download");
              let _ = reply.send(Ok(None));
              return;
            }
        };
        if self.saving.is_some()
        {   debug!("Download rejected: a save is already in progress");
            let _ = reply.send(Err(crate::error::Error::Busy));
            return;
        }

        let artifact = JsonArtifact::new(self.download_name.clone(), text);
        let staging_dir = self.staging_dir.clone();
        let epoch = self.epoch();
        let events = self.events_tx.clone();
        let handle = tokio::spawn(async move {
          let saved = tokio::task::spawn_blocking(move || {
              artifact::save_artifact(&artifact, &staging_dir, target.as_mut())
            })
            .await
            .unwrap_or_else(|e| {
              error!("Download task failed: {}", e);
              Err(crate::error::Error::Other(
                format!("download task failed: {}", e)
              ))
            });
          let _ = events.send(Event::Saved { epoch, saved, reply });
        });
        self.saving = Some(ScheduledTask { epoch, handle });
    }

    fn handle_event(&mut self, event: Event)
    {   match event
        {   Event::Finished { epoch, result } => {
              if !is_current(&self.request, epoch)
              {   debug!("Ignoring stale result (epoch {})", epoch);
                  return;
              }
              self.request = None;
              let success = self.state.finish(result);
              self.publish();
              if success && self.state.start_cooldown()
              {   let epoch = self.epoch();
                  self.cooldown = Some(self.cooldown_task(epoch));
              }
              self.publish();
            }
          , Event::CooldownTick { epoch } => {
              if !is_current(&self.cooldown, epoch)
              {   return;
              }
              if !self.state.tick()
              {   debug!("Cooldown finished");
                  self.cooldown = None;
              }
              self.publish();
            }
          , Event::CopiedExpired { epoch } => {
              if is_current(&self.copied, epoch)
              {   self.copied = None;
                  self.state.set_copied(false);
                  self.publish();
              }
            }
          , Event::DownloadedExpired { epoch } => {
              if is_current(&self.downloaded, epoch)
              {   self.downloaded = None;
                  self.state.set_downloaded(false);
                  self.publish();
              }
            }
          , Event::Saved { epoch, saved, reply } => {
              if is_current(&self.saving, epoch)
              {   self.saving = None;
              }
              if let Ok(Some(path)) = &saved
              {   info!("Download saved to {}", path.display());
                  self.state.set_downloaded(true);
                  let epoch = self.epoch();
                  self.downloaded = Some(self.flash_task(
                    epoch
                  , Event::DownloadedExpired { epoch }
                  ));
                  self.publish();
              }
              let _ = reply.send(saved);
            }
        }
    }

    fn cooldown_task(&self, epoch: u64) -> ScheduledTask
    {   let events = self.events_tx.clone();
        let handle = tokio::spawn(async move {
          let start = tokio::time::Instant::now() + TICK;
          let mut interval = tokio::time::interval_at(start, TICK);
          loop
          {   interval.tick().await;
              if events.send(Event::CooldownTick { epoch }).is_err()
              {   break;
              }
          }
        });
        ScheduledTask { epoch, handle }
    }

    fn flash_task(&self, epoch: u64, expiry: Event) -> ScheduledTask
    {   let events = self.events_tx.clone();
        let delay = self.flash;
        let handle = tokio::spawn(async move {
          tokio::time::sleep(delay).await;
          let _ = events.send(expiry);
        });
        ScheduledTask { epoch, handle }
    }
}

/// Public API for the controller - owns the task
pub struct ClientController
{   hand: crate::ControllerHand
  , snapshot_rx: watch::Receiver<ControllerSnapshot>
  , _task_handle: JoinHandle<()>
}

impl ClientController
{   /// Spawn the controller task. Must be called inside a tokio runtime.
    pub fn new(
      config: &crate::config::ClientConfig
    , transport: Arc<dyn GenerationTransport>
    , clipboard: Box<dyn ClipboardSink>
    ) -> Self
    {   debug!("Creating ClientController");

        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        let (copy_tx, copy_rx) = mpsc::unbounded_channel();
        let (download_tx, download_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx)
          = watch::channel(ControllerSnapshot::initial());

        let hand = crate::ControllerHand
        {   submit_tx
          , copy_tx
          , download_tx
          , shutdown_tx
        };

        let foot = crate::ControllerFoot
        {   submit_rx
          , copy_rx
          , download_rx
          , shutdown_rx
        };

        let task = ControllerTask
        {   state: ControllerState::new(config.cooldown_secs)
          , transport
          , clipboard
          , snapshot_tx
          , events_tx
          , flash: config.flash()
          , download_name: config.download_file_name.clone()
          , staging_dir: config.staging_dir()
          , next_epoch: 0
          , request: None
          , cooldown: None
          , copied: None
          , downloaded: None
          , saving: None
        };

        let _task_handle = tokio::spawn(async move {
          run_controller_loop(foot, events_rx, task).await
        });

        ClientController
        {   hand
          , snapshot_rx
          , _task_handle
        }
    }

    /// Latest published state
    pub fn snapshot(&self) -> ControllerSnapshot
    {   self.snapshot_rx.borrow().clone()
    }

    /// Receiver for renderers that redraw on change
    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot>
    {   self.snapshot_rx.clone()
    }

    /// Submit a prompt. Returns once the request is issued (or rejected);
    /// the outcome arrives through the snapshot.
    pub async fn submit(
      &self
    , input: impl Into<String>
    ) -> crate::SubmitReply
    {   let (reply, reply_rx) = mpsc::unbounded_channel();
        self.hand.submit_tx
          .send(crate::SubmitArgs
          {   input: input.into()
            , reply
          })
          .map_err(|_| disconnected())?;
        await_reply(reply_rx).await
    }

    /// React to a key pressed in the prompt box
    pub async fn key_press(
      &self
    , press: crate::KeyPress
    , input: &str
    ) -> Result<crate::KeyAction, crate::error::Error>
    {   let action = press.action();
        if action == crate::KeyAction::Submit
        {   self.submit(input).await?;
        }
        Ok(action)
    }

    /// Submit and wait for the outcome
    pub async fn generate(
      &self
    , input: impl Into<String>
    ) -> Result<GenerationResult, crate::error::Error>
    {   self.submit(input).await?;
        let snapshot = self
          .wait_until(|s| s.ui != UiState::Submitting)
          .await?;
        snapshot.result.ok_or(crate::error::Error::Disconnected)
    }

    /// Copy the formatted result; `Ok(false)` when there is none
    pub async fn copy_to_clipboard(&self) -> crate::CopyReply
    {   let (reply, reply_rx) = mpsc::unbounded_channel();
        self.hand.copy_tx
          .send(crate::CopyArgs { reply })
          .map_err(|_| disconnected())?;
        await_reply(reply_rx).await
    }

    /// Save the formatted result through `target`
    pub async fn download_as_file(
      &self
    , target: Box<dyn artifact::SaveTarget>
    ) -> crate::DownloadReply
    {   let (reply, reply_rx) = mpsc::unbounded_channel();
        self.hand.download_tx
          .send(crate::DownloadArgs { target, reply })
          .map_err(|_| disconnected())?;
        await_reply(reply_rx).await
    }

    /// Wait for a snapshot matching `predicate`
    pub async fn wait_until<F>(
      &self
    , predicate: F
    ) -> Result<ControllerSnapshot, crate::error::Error>
    where
      F: FnMut(&ControllerSnapshot) -> bool
    {   let mut rx = self.snapshot_rx.clone();
        let snapshot = rx.wait_for(predicate)
          .await
          .map_err(|_| crate::error::Error::Disconnected)?;
        Ok(snapshot.clone())
    }

    /// Stop the task and cancel every pending timer
    pub async fn shutdown(self) -> crate::ShutdownReply
    {   debug!("Shutting down ClientController");
        let (reply, reply_rx) = mpsc::unbounded_channel();
        self.hand.shutdown_tx
          .send(crate::ShutdownArgs { reply })
          .map_err(|_| disconnected())?;
        await_reply(reply_rx).await
    }
}

fn disconnected() -> crate::error::Error
{   error!("Controller channel closed");
    crate::error::Error::Disconnected
}

async fn await_reply<T>(
  mut reply_rx: mpsc::UnboundedReceiver<Result<T, crate::error::Error>>
) -> Result<T, crate::error::Error>
{   reply_rx.recv()
      .await
      .unwrap_or(Err(crate::error::Error::Disconnected))
}

/// Controller event loop. Ends on shutdown or when the handle is dropped;
/// dropping the task state aborts every child task.
async fn run_controller_loop(
  foot: ControllerFoot
, mut events_rx: mpsc::UnboundedReceiver<Event>
, mut task: ControllerTask
)
{   debug!("Starting controller loop");
    let ControllerFoot
    {   mut submit_rx
      , mut copy_rx
      , mut download_rx
      , mut shutdown_rx
    } = foot;

    loop
    { tokio::select!
      { cmd = submit_rx.recv() => {
          match cmd
          {   Some(cmd) => {
                let result = task.handle_submit(cmd.input);
                let _ = cmd.reply.send(result);
              }
            , None => {
                debug!("Controller handle dropped");
                break;
              }
          }
        }
      , Some(cmd) = copy_rx.recv() => {
          let result = task.handle_copy();
          let _ = cmd.reply.send(result);
        }
      , Some(cmd) = download_rx.recv() => {
          task.handle_download(cmd.target, cmd.reply);
        }
      , Some(cmd) = shutdown_rx.recv() => {
          let _ = cmd.reply.send(Ok(()));
          info!("Controller shutting down");
          break;
        }
      , Some(event) = events_rx.recv() => {
          task.handle_event(event);
        }
      }
    }
}

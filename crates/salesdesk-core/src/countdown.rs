//! Countdown clock with per-second ticks and a single timeout event.
//!
//! The clock runs as a background task that owns all timing state; the
//! `Countdown` handle only sends it commands. Events are delivered on the
//! channel returned by [`Countdown::new`] and carry the remaining whole
//! seconds, so a presentation layer can render them directly. The clock has
//! no knowledge of leases or sessions.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};

/// Events emitted by the countdown task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    /// One second elapsed; payload is the remaining whole seconds.
    Tick(u64),
    /// The countdown reached zero. Emitted once; the clock then stops on
    /// its own and stays silent until restarted.
    Timeout,
}

#[derive(Debug)]
enum Command {
    Start(u64),
    Pause,
    Resume,
    Reset(Option<u64>),
    AddTime(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Stopped,
    Running,
    Paused,
}

/// Handle to a countdown task.
///
/// Dropping the handle aborts the task; no further events are emitted.
/// Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct Countdown {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl Countdown {
    /// Spawn a stopped countdown task and return its handle plus the
    /// event stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CountdownEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(command_rx, event_tx));
        (
            Self {
                commands: command_tx,
                task,
            },
            event_rx,
        )
    }

    /// Start counting down from `secs`. Starting at zero times out
    /// immediately. Restarting a running clock replaces its remaining time.
    pub fn start(&self, secs: u64) {
        let _ = self.commands.send(Command::Start(secs));
    }

    /// Suspend ticking; remaining time is frozen. No-op unless running.
    pub fn pause(&self) {
        let _ = self.commands.send(Command::Pause);
    }

    /// Continue ticking after a pause. No-op unless paused.
    pub fn resume(&self) {
        let _ = self.commands.send(Command::Resume);
    }

    /// Restart the clock: with `Some(secs)` from a new duration, with
    /// `None` from the duration given to the last `start`/`reset`.
    pub fn reset(&self, secs: Option<u64>) {
        let _ = self.commands.send(Command::Reset(secs));
    }

    /// Extend the remaining time by `secs` without disturbing the tick
    /// cadence. Ignored while stopped.
    pub fn add_time(&self, secs: u64) {
        let _ = self.commands.send(Command::AddTime(secs));
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<CountdownEvent>,
) {
    let mut phase = Phase::Stopped;
    let mut remaining: u64 = 0;
    let mut initial: u64 = 0;

    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = commands.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                match cmd {
                    Command::Start(secs) | Command::Reset(Some(secs)) => {
                        initial = secs;
                        phase = begin(secs, &mut remaining, &events);
                        interval.reset();
                    }
                    Command::Reset(None) => {
                        phase = begin(initial, &mut remaining, &events);
                        interval.reset();
                    }
                    Command::Pause => {
                        if phase == Phase::Running {
                            phase = Phase::Paused;
                        }
                    }
                    Command::Resume => {
                        if phase == Phase::Paused {
                            phase = Phase::Running;
                            interval.reset();
                        }
                    }
                    Command::AddTime(secs) => {
                        if phase != Phase::Stopped {
                            remaining = remaining.saturating_add(secs);
                        }
                    }
                }
            }
            _ = interval.tick(), if phase == Phase::Running => {
                remaining = remaining.saturating_sub(1);
                let _ = events.send(CountdownEvent::Tick(remaining));
                if remaining == 0 {
                    let _ = events.send(CountdownEvent::Timeout);
                    phase = Phase::Stopped;
                }
            }
        }
    }
}

fn begin(
    secs: u64,
    remaining: &mut u64,
    events: &mpsc::UnboundedSender<CountdownEvent>,
) -> Phase {
    if secs == 0 {
        let _ = events.send(CountdownEvent::Timeout);
        return Phase::Stopped;
    }
    *remaining = secs;
    Phase::Running
}

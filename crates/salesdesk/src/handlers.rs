//! Command handlers. Each one runs against the service graph in
//! [`App`](crate::app::App) and prints in the chosen output format.

use std::sync::Arc;

use serde_json::json;
use tokio::io::AsyncBufReadExt;

use salesdesk_lease::{GuardEvent, LeaseError, LeaseStatus, UnitEditGuard, UnitKey};
use salesdesk_session::{LogoutReason, Profile, SessionError, SessionEvent};

use crate::app::App;
use crate::commands::OutputFormat;
use crate::ui::Colors;

pub type HandlerResult = Result<(), Box<dyn std::error::Error>>;

/// Permission the backend grants to operators allowed to edit reservations.
/// The legacy console hid the edit affordances without it; here the
/// commands that take a lock refuse up front.
const EDIT_PERMISSION: &str = "RESERVA_EDITAR";

pub struct HandlerContext {
    pub app: App,
    pub format: OutputFormat,
}

impl HandlerContext {
    pub fn new(app: App, format: OutputFormat) -> Self {
        Self { app, format }
    }

    fn require_session(&self) -> Result<Profile, SessionError> {
        self.app.keepalive.profile().ok_or(SessionError::NotLoggedIn)
    }

    fn require_edit_permission(&self) -> Result<Profile, SessionError> {
        let profile = self.require_session()?;
        if !profile.has_permission(EDIT_PERMISSION) {
            return Err(SessionError::PermissionDenied {
                permission: EDIT_PERMISSION.to_string(),
            });
        }
        Ok(profile)
    }

    fn print_json(&self, value: &serde_json::Value) -> HandlerResult {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

pub async fn handle_login(ctx: &HandlerContext, username: String, password: String) -> HandlerResult {
    let profile = ctx.app.keepalive.login(&username, &password).await?;
    match ctx.format {
        OutputFormat::Json => ctx.print_json(&json!({
            "user": profile.username,
            "permissions": profile.permissions,
        })),
        OutputFormat::Text => {
            println!(
                "{} logged in as {}",
                Colors::success("✓"),
                Colors::bold(&profile.username)
            );
            if !profile.permissions.is_empty() {
                println!(
                    "{} {}",
                    Colors::dim("permissions:"),
                    profile.permissions.join(", ")
                );
            }
            Ok(())
        }
    }
}

pub async fn handle_logout(ctx: &HandlerContext) -> HandlerResult {
    if !ctx.app.keepalive.is_logged_in() {
        println!("No active session.");
        return Ok(());
    }
    ctx.app.keepalive.logout(LogoutReason::UserRequest);
    println!("{} session ended", Colors::success("✓"));
    Ok(())
}

pub async fn handle_whoami(ctx: &HandlerContext) -> HandlerResult {
    let profile = ctx.require_session()?;
    let remaining = ctx
        .app
        .keepalive
        .remaining()
        .map(|d| d.num_seconds())
        .unwrap_or(0);
    match ctx.format {
        OutputFormat::Json => ctx.print_json(&json!({
            "user": profile.username,
            "permissions": profile.permissions,
            "session_remaining_seconds": remaining,
        })),
        OutputFormat::Text => {
            println!("{}", Colors::bold(&profile.username));
            if !profile.permissions.is_empty() {
                println!(
                    "{} {}",
                    Colors::dim("permissions:"),
                    profile.permissions.join(", ")
                );
            }
            println!("{} {}s", Colors::dim("session expires in:"), remaining);
            Ok(())
        }
    }
}

pub async fn handle_status(ctx: &HandlerContext, key: UnitKey) -> HandlerResult {
    ctx.require_session()?;
    let status = ctx.app.lease.status(&key).await?;
    match ctx.format {
        OutputFormat::Json => ctx.print_json(&json!({
            "unit": key.to_string(),
            "state": status.state().as_str(),
            "held": status.held,
            "held_by_me": status.held_by_me,
            "remaining_seconds": status.remaining_seconds,
            "expires_at": status.expires_at,
        })),
        OutputFormat::Text => {
            print_status_line(&key, &status);
            Ok(())
        }
    }
}

fn print_status_line(key: &UnitKey, status: &LeaseStatus) {
    if !status.held {
        println!("{} {} is free", Colors::success("✓"), Colors::bold(&key.to_string()));
    } else if status.held_by_me {
        println!(
            "{} {} is locked by this session ({}s left)",
            Colors::success("✓"),
            Colors::bold(&key.to_string()),
            status.remaining_seconds
        );
    } else {
        println!(
            "{} {} is locked by another session ({}s left)",
            Colors::warning("!"),
            Colors::bold(&key.to_string()),
            status.remaining_seconds
        );
    }
}

pub async fn handle_lock(ctx: &HandlerContext, key: UnitKey) -> HandlerResult {
    ctx.require_edit_permission()?;
    let grant = ctx.app.lease.acquire(&key).await?;
    match ctx.format {
        OutputFormat::Json => ctx.print_json(&json!({
            "unit": key.to_string(),
            "remaining_seconds": grant.remaining_seconds,
            "expires_at": grant.expires_at,
        })),
        OutputFormat::Text => {
            println!(
                "{} locked {} for {}s",
                Colors::success("✓"),
                Colors::bold(&key.to_string()),
                grant.remaining_seconds
            );
            Ok(())
        }
    }
}

pub async fn handle_renew(ctx: &HandlerContext, key: UnitKey) -> HandlerResult {
    ctx.require_edit_permission()?;
    let grant = ctx.app.lease.renew(&key).await?;
    match ctx.format {
        OutputFormat::Json => ctx.print_json(&json!({
            "unit": key.to_string(),
            "remaining_seconds": grant.remaining_seconds,
            "expires_at": grant.expires_at,
        })),
        OutputFormat::Text => {
            println!(
                "{} extended {} to {}s",
                Colors::success("✓"),
                Colors::bold(&key.to_string()),
                grant.remaining_seconds
            );
            Ok(())
        }
    }
}

pub async fn handle_release(ctx: &HandlerContext, key: UnitKey) -> HandlerResult {
    ctx.require_session()?;
    ctx.app.lease.release(&key).await;
    match ctx.format {
        OutputFormat::Json => ctx.print_json(&json!({
            "unit": key.to_string(),
            "released": true,
        })),
        OutputFormat::Text => {
            println!(
                "{} released {}",
                Colors::success("✓"),
                Colors::bold(&key.to_string())
            );
            Ok(())
        }
    }
}

enum EditOutcome {
    Saved,
    Discarded,
    Expired,
    SessionEnded,
}

/// The interactive edit flow: hold the lock, show the countdown, honor
/// the renewal prompt, and give the unit back on every exit path
/// including Ctrl-C.
pub async fn handle_edit(ctx: &HandlerContext, key: UnitKey) -> HandlerResult {
    ctx.require_edit_permission()?;
    ctx.app.keepalive.start();
    let mut session_events = ctx.app.keepalive.subscribe();

    let (guard, mut events) = UnitEditGuard::enter(Arc::clone(&ctx.app.lease), key.clone()).await?;
    println!(
        "{} editing {} ({}s window)",
        Colors::success("✓"),
        Colors::bold(&key.to_string()),
        guard.remaining_seconds()
    );
    println!(
        "{}",
        Colors::dim("r = renew window, s = save and exit, q = discard and exit")
    );

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(GuardEvent::Tick { remaining_seconds }) => {
                    if remaining_seconds % 30 == 0 || remaining_seconds <= 10 {
                        println!("{} {}s left", Colors::dim("·"), remaining_seconds);
                    }
                }
                Some(GuardEvent::RenewPrompt { remaining_seconds }) => {
                    println!(
                        "{} window closes in {}s; type r to renew",
                        Colors::warning("!"),
                        remaining_seconds
                    );
                }
                Some(GuardEvent::Expired) | None => {
                    println!(
                        "{} editing window closed; unsaved changes were discarded",
                        Colors::error("✗")
                    );
                    break EditOutcome::Expired;
                }
            },
            line = lines.next_line() => {
                ctx.app.monitor.record();
                match line?.as_deref() {
                    Some("r") => match guard.renew().await {
                        Ok(secs) => println!(
                            "{} window extended to {}s",
                            Colors::success("✓"),
                            secs
                        ),
                        Err(e @ LeaseError::Gone { .. }) => {
                            eprintln!("{} {}", Colors::error("Error:"), e);
                            break EditOutcome::Expired;
                        }
                        // Transient failure: the window keeps counting down
                        // and the operator may try again.
                        Err(e) => eprintln!("{} {}", Colors::error("Error:"), e),
                    },
                    Some("s") => break EditOutcome::Saved,
                    Some("q") => break EditOutcome::Discarded,
                    Some(_) => {}
                    None => break EditOutcome::Discarded,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break EditOutcome::Discarded;
            }
            event = session_events.recv() => match event {
                Ok(SessionEvent::LoggedOut { reason }) => {
                    eprintln!("{} session ended ({})", Colors::error("✗"), reason);
                    break EditOutcome::SessionEnded;
                }
                Ok(SessionEvent::IdleWarning { remaining_seconds }) => {
                    println!(
                        "{} no activity for a while; the session ends in {}s",
                        Colors::warning("!"),
                        remaining_seconds
                    );
                }
                _ => {}
            }
        }
    };

    match outcome {
        EditOutcome::Saved => {
            guard.finish().await;
            println!(
                "{} saved; {} released",
                Colors::success("✓"),
                Colors::bold(&key.to_string())
            );
        }
        EditOutcome::Discarded => {
            guard.cancel().await;
            println!(
                "{} released {} without saving",
                Colors::success("✓"),
                Colors::bold(&key.to_string())
            );
        }
        EditOutcome::Expired | EditOutcome::SessionEnded => {
            // The lease is already gone (or the token is); cancel only
            // tidies up.
            guard.cancel().await;
        }
    }

    ctx.app.keepalive.shutdown();
    Ok(())
}

use clap::CommandFactory;
use clap::Parser;
use clap_complete::generate;

use salesdesk::app::App;
use salesdesk::commands::Cli;
use salesdesk::commands::Commands;
use salesdesk::handlers;
use salesdesk::handlers::HandlerContext;
use salesdesk::telemetry;
use salesdesk::ui;
use salesdesk::ui::Colors;
use salesdesk_api::ApiError;
use salesdesk_api::ErrorCategory;
use salesdesk_lease::LeaseError;
use salesdesk_session::SessionError;

fn main() {
    if let Err(e) = run() {
        if let Some(lease_error) = e.downcast_ref::<LeaseError>() {
            report(
                &lease_error.to_string(),
                lease_error.suggestion(),
                lease_error.is_retryable(),
            );
            std::process::exit(exit_code(lease_error.category()));
        } else if let Some(session_error) = e.downcast_ref::<SessionError>() {
            report(
                &session_error.to_string(),
                session_error.suggestion(),
                session_error.is_retryable(),
            );
            std::process::exit(exit_code(session_error.category()));
        } else if let Some(api_error) = e.downcast_ref::<ApiError>() {
            report(
                &api_error.to_string(),
                api_error.suggestion(),
                api_error.is_retryable(),
            );
            std::process::exit(exit_code(api_error.category()));
        } else {
            eprintln!("{} {}", Colors::error("Error:"), e);
            std::process::exit(1);
        }
    }
}

fn report(message: &str, suggestion: Option<String>, retryable: bool) {
    eprintln!("{} {}", Colors::error("Error:"), message);
    if let Some(suggestion) = suggestion {
        eprintln!("{} {}", Colors::dim("Suggestion:"), suggestion);
    }
    if retryable {
        eprintln!(
            "{}",
            Colors::dim("(This error may be transient - retry may succeed)")
        );
    }
}

fn exit_code(category: ErrorCategory) -> i32 {
    match category {
        ErrorCategory::Conflict => 73, // EX_CANTCREAT
        ErrorCategory::NotFound => 69, // EX_UNAVAILABLE
        ErrorCategory::Auth => 77,     // EX_NOPERM
        ErrorCategory::External => 74, // EX_IOERR
        ErrorCategory::Internal => 74, // EX_IOERR
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    ui::init(cli.no_color);
    let _telemetry = telemetry::init_tracing("warn");

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "salesdesk", &mut std::io::stdout());
        return Ok(());
    }

    let format = cli.effective_format();
    let app = App::build(cli.api_url)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        app.keepalive.resume();
        let ctx = HandlerContext::new(app, format);

        match cli.command {
            Commands::Completions { .. } => unreachable!(),

            Commands::Login { username, password } => {
                handlers::handle_login(&ctx, username, password).await
            }
            Commands::Logout => handlers::handle_logout(&ctx).await,
            Commands::Whoami => handlers::handle_whoami(&ctx).await,

            Commands::Status { unit } => handlers::handle_status(&ctx, unit.key()).await,
            Commands::Lock { unit } => handlers::handle_lock(&ctx, unit.key()).await,
            Commands::Renew { unit } => handlers::handle_renew(&ctx, unit.key()).await,
            Commands::Release { unit } => handlers::handle_release(&ctx, unit.key()).await,
            Commands::Edit { unit } => handlers::handle_edit(&ctx, unit.key()).await,
        }
    })
}

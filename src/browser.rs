/// Browser launching with ordered platform fallbacks
use std::io;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, info, warn};

type LaunchFn = dyn Fn(&str) -> io::Result<()> + Send + Sync;

/// A single named way of opening a URL
#[derive(Clone)]
pub struct LaunchStrategy {
    name: String,
    launch: Arc<LaunchFn>,
}

impl LaunchStrategy {
    pub fn new(
        name: impl Into<String>,
        launch: impl Fn(&str) -> io::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            launch: Arc::new(launch),
        }
    }

    /// Strategy that runs `program [args..] <url>` and checks it did not fail
    pub fn command(program: &'static str, args: &'static [&'static str]) -> Self {
        let name = if args.is_empty() {
            program.to_string()
        } else {
            format!("{program} {}", args.join(" "))
        };

        Self::new(name, move |url| {
            let status = Command::new(program)
                .args(args)
                .arg(url)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()?;

            if status.success() {
                Ok(())
            } else {
                Err(io::Error::other(format!("{program} exited with {status}")))
            }
        })
    }

    /// Strategy that spawns `program [args..] <url>` without waiting for it
    ///
    /// For browser binaries that stay in the foreground until the window is
    /// closed. Success only means the process started.
    pub fn detached(program: &'static str, args: &'static [&'static str]) -> Self {
        Self::new(program, move |url| {
            let mut child = Command::new(program)
                .args(args)
                .arg(url)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()?;

            // Reap the child whenever the user closes it.
            std::thread::spawn(move || {
                let _ = child.wait();
            });
            Ok(())
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for LaunchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchStrategy")
            .field("name", &self.name)
            .finish()
    }
}

/// What happened when we tried to open the browser
///
/// `opened` only means a strategy reported success; it does not prove the
/// page is in front of the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub opened: bool,
    pub manual_required: bool,
    pub strategy: Option<String>,
}

/// Opens URLs through an ordered list of strategies, first success wins
#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    strategies: Vec<LaunchStrategy>,
}

impl Default for BrowserLauncher {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl BrowserLauncher {
    /// Launcher with an explicit strategy list
    pub fn with_strategies(strategies: Vec<LaunchStrategy>) -> Self {
        Self { strategies }
    }

    /// Launcher that never opens anything and always asks for manual steps
    pub fn manual_only() -> Self {
        Self::with_strategies(Vec::new())
    }

    /// Strategies appropriate for the current platform, most generic first
    pub fn platform_default() -> Self {
        let mut strategies = vec![LaunchStrategy::new("webbrowser", |url| {
            webbrowser::open(url)
        })];

        #[cfg(target_os = "macos")]
        strategies.extend([
            LaunchStrategy::command("open", &[]),
            LaunchStrategy::command("open", &["-a", "Safari"]),
            LaunchStrategy::command("open", &["-a", "Google Chrome"]),
            LaunchStrategy::new("osascript", |url| {
                let script = format!(
                    "open location \"{}\"",
                    url.replace('\\', "\\\\").replace('"', "\\\"")
                );
                let status = Command::new("osascript")
                    .args(["-e", &script])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()?;
                if status.success() {
                    Ok(())
                } else {
                    Err(io::Error::other(format!("osascript exited with {status}")))
                }
            }),
        ]);

        // `cmd /C start` would split the URL at its first `&`.
        #[cfg(target_os = "windows")]
        strategies.extend([
            LaunchStrategy::command("rundll32", &["url.dll,FileProtocolHandler"]),
            LaunchStrategy::detached("explorer", &[]),
        ]);

        #[cfg(all(unix, not(target_os = "macos")))]
        strategies.extend([
            LaunchStrategy::command("xdg-open", &[]),
            LaunchStrategy::detached("sensible-browser", &[]),
            LaunchStrategy::detached("google-chrome", &[]),
            LaunchStrategy::detached("chromium", &[]),
            LaunchStrategy::detached("firefox", &[]),
        ]);

        Self { strategies }
    }

    pub fn strategies(&self) -> &[LaunchStrategy] {
        &self.strategies
    }

    /// Try each strategy in order; never fails
    pub fn launch(&self, url: &str) -> LaunchOutcome {
        for strategy in &self.strategies {
            match (strategy.launch)(url) {
                Ok(()) => {
                    info!(strategy = strategy.name(), "browser launch reported success");
                    return LaunchOutcome {
                        opened: true,
                        manual_required: false,
                        strategy: Some(strategy.name.clone()),
                    };
                }
                Err(e) => debug!(strategy = strategy.name(), error = %e, "browser strategy failed"),
            }
        }

        warn!("could not open a browser automatically");
        LaunchOutcome {
            opened: false,
            manual_required: true,
            strategy: None,
        }
    }

    /// Launch on the blocking pool without waiting for the outcome
    ///
    /// The sign-in URL must already be on screen; this only adds a notice
    /// when no strategy succeeded.
    pub fn launch_detached(&self, url: &str) {
        let launcher = self.clone();
        let url = url.to_string();
        tokio::task::spawn_blocking(move || {
            if launcher.launch(&url).manual_required {
                eprintln!("{}", LAUNCH_FAILED_NOTICE);
            }
        });
    }
}

const LAUNCH_FAILED_NOTICE: &str =
    "Could not open a browser automatically. Open the URL above to continue.";

/// Text shown to the user for every interactive login, before any launch
pub fn sign_in_instructions(url: &str) -> String {
    format!("\nOpening your browser to sign in. If it does not open, visit this URL:\n\n    {url}\n")
}

/// Print sign-in instructions to stderr so stdout stays free for clients.
pub fn print_sign_in_instructions(url: &str) {
    eprintln!("{}", sign_in_instructions(url));
}

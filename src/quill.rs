use std::sync::Arc;

use anyhow::{Context, Result};
use arboard::Clipboard;
use clap::Parser;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use quill::cli::{Cli, Command, run_settings};
use quill::context::{AppContext, AppPaths};
use quill::event::QuillEvent;
use quill::hotkey::HotkeyBindings;
use quill::icon::ActivityStateExt;
use quill::pipeline::Pipeline;
use quill::settings::SettingsController;
use quill::tray::{TrayAction, TrayMenu};
use quill::{ActivityState, logging};
use tao::event::{Event, StartCause};
use tao::event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy};
use tracing::{debug, error, info};
use tray_icon::TrayIconBuilder;
use tray_icon::menu::MenuEvent;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = AppPaths::resolve(cli.config.clone(), cli.defaults.clone())?;

    // Only the tray daemon raises desktop notifications
    let daemon = matches!(cli.command_or_run(), Command::Run);
    logging::init(&paths.log, daemon)?;

    let context = Arc::new(AppContext::new(paths)?);
    match cli.command_or_run() {
        Command::Run => run_tray(context),
        Command::Settings(command) => {
            let controller = SettingsController::new(context);
            run_settings(&controller, command, &mut std::io::stdout().lock())
        }
    }
}

/// Forwards hotkey and menu events into the event loop so they wake it.
fn forward_events(proxy: &EventLoopProxy<QuillEvent>) {
    let hotkey_proxy = proxy.clone();
    std::thread::spawn(move || {
        let receiver = GlobalHotKeyEvent::receiver();
        while let Ok(event) = receiver.recv() {
            if hotkey_proxy.send_event(QuillEvent::Hotkey(event)).is_err() {
                break;
            }
        }
    });

    let menu_proxy = proxy.clone();
    std::thread::spawn(move || {
        let receiver = MenuEvent::receiver();
        while let Ok(event) = receiver.recv() {
            if menu_proxy.send_event(QuillEvent::Menu(event)).is_err() {
                break;
            }
        }
    });
}

fn run_tray(context: Arc<AppContext>) -> Result<()> {
    // save back the settings to create the file if it doesn't exist
    context.settings().read().save()?;

    let hotkey_manager = GlobalHotKeyManager::new().context("Failed to create hotkey manager")?;
    let mut bindings = HotkeyBindings::register(&hotkey_manager, &context.snapshot());

    // Used for the "copy path" menu items; the dispatcher has its own
    let mut clipboard = Clipboard::new().context("Failed to open clipboard")?;

    let tray_menu = TrayMenu::new()?;
    let mut icon_tray = None;

    let event_loop: EventLoop<QuillEvent> = EventLoopBuilder::with_user_event().build();
    let event_sender = event_loop.create_proxy();
    forward_events(&event_sender);

    let mut pipeline = Some(Pipeline::spawn(context.clone(), event_sender.clone())?);

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;

        if let Event::NewEvents(StartCause::Init) = event {
            // We create the icon once the event loop is actually running
            // to prevent issues like https://github.com/tauri-apps/tray-icon/issues/90
            match TrayIconBuilder::new()
                .with_menu(Box::new(tray_menu.menu().clone()))
                .with_tooltip("quill - rewrite highlighted text")
                .with_icon(ActivityState::Idle.icon())
                .build()
            {
                Ok(tray) => {
                    icon_tray.replace(tray);
                }
                Err(e) => error!("Failed to create tray icon: {}", e),
            }

            // Tao only exposes a redraw method on the Window so we wake the
            // run loop with core-foundation to have the icon show up.
            #[cfg(target_os = "macos")]
            unsafe {
                use core_foundation::runloop::{CFRunLoopGetMain, CFRunLoopWakeUp};

                let rl = CFRunLoopGetMain();
                CFRunLoopWakeUp(rl);
            }

            info!(hotkeys = bindings.len(), "Quill ready");
        }

        let Event::UserEvent(event) = event else {
            return;
        };
        match event {
            QuillEvent::Hotkey(event) => {
                if event.state() != HotKeyState::Pressed {
                    return;
                }
                let (Some(action), Some(pipeline)) =
                    (bindings.action_for(event.id()), pipeline.as_ref())
                else {
                    return;
                };
                if let Err(e) = pipeline.submit(action) {
                    error!("Failed to submit hotkey action: {:#}", e);
                }
            }
            QuillEvent::Menu(event) => match tray_menu.action_for(&event.id) {
                Some(TrayAction::CopyConfigPath) => {
                    let path = context.paths().config.to_string_lossy().into_owned();
                    if let Err(e) = clipboard.set_text(path) {
                        error!("Failed to copy config path to clipboard: {}", e);
                    }
                }
                Some(TrayAction::CopyLogPath) => {
                    let path = context.paths().log.to_string_lossy().into_owned();
                    if let Err(e) = clipboard.set_text(path) {
                        error!("Failed to copy log path to clipboard: {}", e);
                    }
                }
                Some(TrayAction::ReloadSettings) => {
                    if let Err(e) = context.settings().write().load(None) {
                        error!("Failed to reload settings: {}", e);
                    }
                    context.rebind_catalog();
                    bindings.unregister_all(&hotkey_manager);
                    bindings = HotkeyBindings::register(&hotkey_manager, &context.snapshot());
                    info!(hotkeys = bindings.len(), "Settings reloaded");
                }
                Some(TrayAction::ResetSettings) => {
                    if let Err(e) = context.settings().write().reset() {
                        error!("Failed to reset settings: {}", e);
                    }
                    context.rebind_catalog();
                    bindings.unregister_all(&hotkey_manager);
                    bindings = HotkeyBindings::register(&hotkey_manager, &context.snapshot());
                }
                Some(TrayAction::Quit) => {
                    icon_tray.take();
                    bindings.unregister_all(&hotkey_manager);
                    if let Some(pipeline) = pipeline.take() {
                        pipeline.shutdown();
                    }
                    *control_flow = ControlFlow::Exit;
                }
                None => {}
            },
            QuillEvent::StateChanged(state) => {
                debug!(state = ?state, "State changed");
                if let Some(tray) = icon_tray.as_ref() {
                    if let Err(e) = tray.set_icon(Some(state.icon())) {
                        error!("Failed to update tray icon: {}", e);
                    }
                }
            }
            QuillEvent::Finished { action, outcome } => {
                debug!(action = %action, outcome = ?outcome, "Request finished");
            }
        }
    });
}

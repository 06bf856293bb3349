//! The tray menu.

use tray_icon::menu::{AboutMetadataBuilder, Menu, MenuId, MenuItem, PredefinedMenuItem};

use crate::{APP_NAME_PRETTY, VERSION};

/// What a menu click asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayAction {
    CopyConfigPath,
    CopyLogPath,
    ReloadSettings,
    ResetSettings,
    Quit,
}

pub struct TrayMenu {
    menu: Menu,
    items: Vec<(MenuId, TrayAction)>,
}

impl TrayMenu {
    pub fn new() -> anyhow::Result<Self> {
        let copy_config = MenuItem::new("Copy config path", true, None);
        let copy_log = MenuItem::new("Copy log path", true, None);
        let reload = MenuItem::new("Reload settings", true, None);
        let reset = MenuItem::new("Reset settings", true, None);
        let quit = MenuItem::new("Quit", true, None);

        let menu = Menu::new();
        menu.append_items(&[
            // the name of the app
            &MenuItem::new(APP_NAME_PRETTY, false, None),
            &PredefinedMenuItem::separator(),
            &PredefinedMenuItem::about(
                None,
                Some(
                    AboutMetadataBuilder::new()
                        .version(Some(VERSION.to_owned()))
                        .build(),
                ),
            ),
            &copy_config,
            &copy_log,
            &reload,
            &reset,
            &PredefinedMenuItem::separator(),
            &quit,
        ])?;

        let items = vec![
            (copy_config.id().clone(), TrayAction::CopyConfigPath),
            (copy_log.id().clone(), TrayAction::CopyLogPath),
            (reload.id().clone(), TrayAction::ReloadSettings),
            (reset.id().clone(), TrayAction::ResetSettings),
            (quit.id().clone(), TrayAction::Quit),
        ];
        Ok(Self { menu, items })
    }

    pub fn menu(&self) -> &Menu {
        &self.menu
    }

    pub fn action_for(&self, id: &MenuId) -> Option<TrayAction> {
        self.items
            .iter()
            .find(|(item, _)| item == id)
            .map(|(_, action)| *action)
    }
}

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::protocol::{CaptureData, ContextId};
use crate::surface::EditorParams;

pub const MENU_ITEM_ID: &str = "create-clipping";
pub const MENU_ITEM_TITLE: &str = "Create clipping";
pub const CAPTURE_COMMAND: &str = "create-clipping";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuContext {
    Selection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    pub title: String,
    pub contexts: Vec<MenuContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    #[serde(default)]
    pub id: Option<ContextId>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

/// Live selection and page details read out of a tab.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    #[serde(default)]
    pub selection: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuClickInfo {
    pub menu_item_id: String,
    #[serde(default)]
    pub selection_text: Option<String>,
    #[serde(default)]
    pub page_url: Option<String>,
}

pub trait MenuService {
    fn register(&self, item: MenuItem) -> Result<()>;
}

pub trait TabQueryService {
    fn active_tab(&self) -> Option<Tab>;
    fn read_page(&self, tab: &Tab) -> Option<PageSnapshot>;
}

/// Opens the surfaces a capture can land on.
pub trait SurfaceLauncher {
    /// Injects the overlay into `tab` and asks it to show `data`.
    fn show_overlay(&self, tab: ContextId, data: &CaptureData) -> Result<()>;
    fn open_editor(&self, params: &EditorParams) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureRoute {
    Overlay { tab_id: ContextId, data: CaptureData },
    Standalone(EditorParams),
}

pub fn register_menu(menu: &dyn MenuService) -> Result<()> {
    menu.register(MenuItem {
        id: MENU_ITEM_ID.to_string(),
        title: MENU_ITEM_TITLE.to_string(),
        contexts: vec![MenuContext::Selection],
    })
}

/// The menu event already carries the selection; the tab supplies title
/// and URL when present.
pub fn route_menu_click(info: &MenuClickInfo, tab: Option<&Tab>) -> Option<CaptureRoute> {
    if info.menu_item_id != MENU_ITEM_ID {
        return None;
    }
    let text = info.selection_text.clone().unwrap_or_default();
    let url = tab
        .map(|t| t.url.clone())
        .filter(|u| !u.is_empty())
        .or_else(|| info.page_url.clone())
        .unwrap_or_default();
    let title = tab.map(|t| t.title.clone()).unwrap_or_default();

    Some(match tab.and_then(|t| t.id) {
        Some(tab_id) => CaptureRoute::Overlay {
            tab_id,
            data: CaptureData { text, title, url },
        },
        None => CaptureRoute::Standalone(EditorParams {
            text,
            url,
            title,
            ..Default::default()
        }),
    })
}

/// The shortcut has no event context, so the focused tab is queried and
/// its live selection read, falling back to the tab's own title and URL.
pub fn route_command(command: &str, tabs: &dyn TabQueryService) -> Option<CaptureRoute> {
    if command != CAPTURE_COMMAND {
        return None;
    }
    let Some(tab) = tabs.active_tab() else {
        return Some(CaptureRoute::Standalone(EditorParams::default()));
    };
    let Some(tab_id) = tab.id else {
        return Some(CaptureRoute::Standalone(EditorParams {
            url: tab.url,
            ..Default::default()
        }));
    };

    let data = match tabs.read_page(&tab) {
        Some(page) => CaptureData {
            text: page.selection,
            title: non_empty_or(page.title, &tab.title),
            url: non_empty_or(page.url, &tab.url),
        },
        None => CaptureData {
            text: String::new(),
            title: tab.title.clone(),
            url: tab.url.clone(),
        },
    };
    Some(CaptureRoute::Overlay { tab_id, data })
}

/// Opens the route's surface. An overlay that cannot be injected (for
/// example on a browser-internal page) degrades to the standalone editor.
pub fn dispatch(route: &CaptureRoute, launcher: &dyn SurfaceLauncher) -> Result<()> {
    match route {
        CaptureRoute::Overlay { tab_id, data } => {
            if let Err(e) = launcher.show_overlay(*tab_id, data) {
                tracing::warn!(tab = *tab_id, error = %e, "overlay unavailable, opening editor");
                return launcher.open_editor(&EditorParams {
                    text: data.text.clone(),
                    url: data.url.clone(),
                    title: data.title.clone(),
                    ..Default::default()
                });
            }
            Ok(())
        }
        CaptureRoute::Standalone(params) => launcher.open_editor(params),
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() { fallback.to_string() } else { value }
}

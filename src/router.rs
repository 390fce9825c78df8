//! View routing
//!
//! Three mutually exclusive views. Only the chat view is bound to the
//! live conversation; the tool views keep their own state.

/// Which view is on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Chat,
    FaceLab,
    WanAnalysis,
}

impl View {
    pub fn all() -> &'static [View] {
        &[View::Chat, View::FaceLab, View::WanAnalysis]
    }

    pub fn name(&self) -> &'static str {
        match self {
            View::Chat => "Chat",
            View::FaceLab => "Face Lab",
            View::WanAnalysis => "WAN Analysis",
        }
    }

    pub fn next(&self) -> View {
        let views = View::all();
        let idx = views.iter().position(|v| v == self).unwrap_or(0);
        views[(idx + 1) % views.len()]
    }
}

/// What the chat state has to do after a navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatReset {
    /// Leave the live conversation alone
    Keep,
    /// Clear the live list and unbind from history
    Fresh,
    /// Load history entry `index` into the live list
    Restore(usize),
}

/// Current view and the navigation rules between views
#[derive(Debug, Default)]
pub struct ViewRouter {
    view: View,
}

impl ViewRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn in_chat(&self) -> bool {
        self.view == View::Chat
    }

    /// Sidebar "new" action. A new chat resets the conversation;
    /// opening a tool view does not touch it.
    pub fn new_session(&mut self, view: View) -> ChatReset {
        self.view = view;
        match view {
            View::Chat => ChatReset::Fresh,
            View::FaceLab | View::WanAnalysis => ChatReset::Keep,
        }
    }

    /// Sidebar history click
    pub fn select_history(&mut self, index: usize) -> ChatReset {
        self.view = View::Chat;
        ChatReset::Restore(index)
    }

    /// Switch views without resetting anything
    pub fn show(&mut self, view: View) -> ChatReset {
        self.view = view;
        ChatReset::Keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_chat_resets() {
        let mut router = ViewRouter::new();
        router.show(View::WanAnalysis);
        assert_eq!(router.new_session(View::Chat), ChatReset::Fresh);
        assert!(router.in_chat());
    }

    #[test]
    fn test_tool_views_keep_chat() {
        let mut router = ViewRouter::new();
        assert_eq!(router.new_session(View::FaceLab), ChatReset::Keep);
        assert_eq!(router.view(), View::FaceLab);
        assert_eq!(router.new_session(View::WanAnalysis), ChatReset::Keep);
        assert!(!router.in_chat());
    }

    #[test]
    fn test_select_history_returns_to_chat() {
        let mut router = ViewRouter::new();
        router.show(View::FaceLab);
        assert_eq!(router.select_history(3), ChatReset::Restore(3));
        assert_eq!(router.view(), View::Chat);
    }

    #[test]
    fn test_view_cycle() {
        assert_eq!(View::Chat.next(), View::FaceLab);
        assert_eq!(View::FaceLab.next(), View::WanAnalysis);
        assert_eq!(View::WanAnalysis.next(), View::Chat);
    }
}

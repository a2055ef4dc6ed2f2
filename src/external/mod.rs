pub mod remnawave;
#[cfg(test)]
pub mod fake_panel;

pub use remnawave::{
    CreatePanelUser, InternalSquad, PanelApi, PanelUser, PanelUserStatus, PanelUsersPage,
    RemnaWaveClient, SystemStats, UpdatePanelUser,
};

pub mod chart_view;
pub mod controls;
pub mod data_view;
pub mod sidebar;
pub mod text_input;

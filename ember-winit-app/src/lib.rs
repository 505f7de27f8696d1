//! winit 窗口系统与 ember-gfx 之间的适配层

pub mod app;
pub mod winit_event_adapter;

mod common;
mod fs_project;
mod pipeline_events;
mod properties;
mod runtime_queue;
mod selection_flow;

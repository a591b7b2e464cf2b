pub mod deferred;
pub mod render_objects;
pub mod resources_collection;

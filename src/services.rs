pub mod field_group;
pub mod river_data_service;

pub use field_group::{FieldGroup, FieldState};
pub use river_data_service::{
    FieldStates, RefreshHandle, RiverDataService, ServiceError, Snapshot, SourceKind, SourceState, SourceStatus, StationView,
};

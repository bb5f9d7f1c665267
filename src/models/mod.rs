pub mod vehicle;

pub use vehicle::{
    build_fleet_list, FleetListResponse, RouteListResponse, RouteView, VehicleView,
};

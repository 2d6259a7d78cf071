use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use log::info;
use warp::{Filter, Reply};

use super::routes::*;
use super::types::AppState;
use crate::error_handling::types::WebError;

/// Web server for the HTTP API and the console page
pub struct WebServer {
    state: AppState,
}

impl WebServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Every route, with rejections turned into JSON errors.
    pub fn routes(&self) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
        let state = self.state.clone();

        let pages = index_route().or(assets_route());
        let records = records_route(state.clone())
            .or(export_route(state.clone()))
            .or(resources_route(state.clone()));
        let inspection = selection_route(state.clone()).or(detail_route(state.clone()));
        let monitor = monitor_status_route(state.clone())
            .or(pause_route(state.clone()))
            .or(resume_route(state.clone()))
            .or(interface_route(state.clone()));
        let session = login_route(state.clone())
            .or(logout_route(state.clone()))
            .or(session_route(state.clone()))
            .or(password_route(state.clone()));
        let admin = activity_route(state.clone())
            .or(import_activity_route(state.clone()))
            .or(list_users_route(state.clone()))
            .or(add_user_route(state.clone()))
            .or(update_user_route(state.clone()))
            .or(delete_user_route(state.clone()));
        let analysis = traffic_analysis_route(state.clone())
            .or(security_report_route(state.clone()))
            .or(log_analysis_route(state.clone()))
            .or(dashboard_route(state));

        pages
            .or(records)
            .or(inspection)
            .or(monitor)
            .or(session)
            .or(admin)
            .or(analysis)
            .recover(handle_rejection)
    }

    /// Serves until the task is dropped or aborted.
    pub async fn start(&self, bind_address: &str, port: u16) -> Result<(), WebError> {
        let ip: IpAddr = bind_address
            .parse()
            .map_err(|_| WebError::BindFailed(format!("invalid address {}", bind_address)))?;
        let addr = SocketAddr::new(ip, port);

        // Fail early with an error instead of a panic inside warp.
        std::net::TcpListener::bind(addr)
            .map_err(|e| WebError::BindFailed(format!("{}: {}", addr, e)))?;

        info!("Web console listening on http://{}", addr);
        warp::serve(self.routes()).run(addr).await;
        Ok(())
    }
}

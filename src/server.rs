use crate::{
    config::Config, labels::ClassLabels, model_service::DetectionModel, routes::api_routes,
};
use axum::{extract::DefaultBodyLimit, Router};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::timeout::TimeoutLayer;

#[derive(Clone)]
pub struct SharedState {
    pub model: Arc<dyn DetectionModel>,
    pub labels: Arc<ClassLabels>,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

pub fn build_router(state: SharedState) -> Router {
    Router::new().merge(api_routes()).with_state(state)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(
        model: Arc<dyn DetectionModel>,
        labels: ClassLabels,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let app_state = SharedState {
            model,
            labels: Arc::new(labels),
            confidence_threshold: config.model.confidence_threshold,
            iou_threshold: config.model.iou_threshold,
        };

        let router = build_router(app_state)
            .layer(DefaultBodyLimit::max(config.server.max_upload_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.server.request_timeout_secs,
            )));

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", &self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                let server = axum::serve(listener, router);
                server
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_service::{DetectionModel, InferenceError, RawDetection};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use image::DynamicImage;
    use tower::ServiceExt;

    struct NullModel;

    impl DetectionModel for NullModel {
        fn detect(
            &self,
            _image: &DynamicImage,
            _confidence_threshold: f32,
            _iou_threshold: f32,
        ) -> Result<Vec<RawDetection>, InferenceError> {
            Ok(Vec::new())
        }
    }

    fn test_state() -> SharedState {
        SharedState {
            model: Arc::new(NullModel),
            labels: Arc::new(ClassLabels::new(vec!["plastic-bottle".to_string()])),
            confidence_threshold: 0.4,
            iou_threshold: 0.5,
        }
    }

    #[tokio::test]
    async fn health_endpoints_report_readiness() {
        for uri in ["/", "/healthz"] {
            let app = build_router(test_state());
            let response = app
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["ready"], true);
            assert_eq!(json["modelLoaded"], true);
        }
    }
}

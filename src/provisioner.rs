use futures::StreamExt;
use reqwest::StatusCode;
use std::path::Path;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum ProvisioningError {
    #[error("Failed to fetch model artifact: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("Remote store returned status {0} for model artifact")]
    RemoteStatus(StatusCode),
    #[error("Failed to store model artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Makes sure the model artifact exists at `path`, fetching it from
/// `remote_url` if it does not. The download streams through a `.part`
/// sibling file and is renamed into place only once complete, so an
/// interrupted fetch never leaves a truncated artifact at `path`.
pub async fn ensure(path: &Path, remote_url: &str) -> Result<(), ProvisioningError> {
    if fs::try_exists(path).await? {
        tracing::info!("Model artifact already present at {}", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    tracing::info!("Fetching model artifact from {}", remote_url);
    let response = reqwest::get(remote_url).await?;
    if !response.status().is_success() {
        return Err(ProvisioningError::RemoteStatus(response.status()));
    }

    let part_path = path.with_extension("part");
    if let Err(e) = write_stream(response, &part_path).await {
        let _ = fs::remove_file(&part_path).await;
        return Err(e);
    }
    fs::rename(&part_path, path).await?;

    tracing::info!("Model artifact stored at {}", path.display());
    Ok(())
}

async fn write_stream(
    response: reqwest::Response,
    part_path: &Path,
) -> Result<(), ProvisioningError> {
    let mut file = File::create(part_path).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn serve_once(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response).await;
            }
        });
        format!("http://{}/waste_detector.onnx", addr)
    }

    #[tokio::test]
    async fn ensure_is_a_noop_when_artifact_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waste_detector.onnx");
        fs::write(&path, b"weights").await.unwrap();

        ensure(&path, "http://127.0.0.1:9/unreachable")
            .await
            .unwrap();

        assert_eq!(fs::read(&path).await.unwrap(), b"weights");
    }

    #[tokio::test]
    async fn ensure_stores_fetched_artifact() {
        let url = serve_once(b"HTTP/1.1 200 OK\r\ncontent-length: 7\r\n\r\nweights").await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("waste_detector.onnx");

        ensure(&path, &url).await.unwrap();

        assert_eq!(fs::read(&path).await.unwrap(), b"weights");
        assert!(!path.with_extension("part").exists());
    }

    #[tokio::test]
    async fn ensure_fails_when_remote_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waste_detector.onnx");

        let err = ensure(&path, "http://127.0.0.1:9/waste_detector.onnx")
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisioningError::Fetch(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn ensure_rejects_non_success_status() {
        let url = serve_once(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n").await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waste_detector.onnx");

        let err = ensure(&path, &url).await.unwrap_err();

        assert!(matches!(
            err,
            ProvisioningError::RemoteStatus(StatusCode::NOT_FOUND)
        ));
        assert!(!path.exists());
    }
}

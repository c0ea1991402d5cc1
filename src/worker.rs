use eframe::egui;
use image::RgbaImage;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::api::{ApiClient, PredictResponse, SaveRequest, SaveResponse};
use crate::error::ApiError;
use crate::session::SelectedFile;

/// Result of an upload: the locally decoded image plus what the server said
/// about its own copy.
pub struct UploadedImage {
    pub image: RgbaImage,
    pub remote_name: String,
    pub remote_size: Option<[u32; 2]>,
}

pub enum WorkerEvent {
    Uploaded {
        generation: u64,
        file: SelectedFile,
        result: Result<UploadedImage, ApiError>,
    },
    Predicted {
        generation: u64,
        result: Result<PredictResponse, ApiError>,
    },
    Saved {
        result: Result<SaveResponse, ApiError>,
    },
}

/// Runs each request on its own thread and hands results back to the UI
/// thread through a channel. Requests are neither cancelled nor serialized.
pub struct Worker {
    client: ApiClient,
    ctx: egui::Context,
    tx: Sender<WorkerEvent>,
    rx: Receiver<WorkerEvent>,
}

impl Worker {
    pub fn new(client: ApiClient, ctx: egui::Context) -> Self {
        let (tx, rx) = mpsc::channel();
        Self { client, ctx, tx, rx }
    }

    pub fn upload(&self, generation: u64, file: SelectedFile) -> Result<(), ApiError> {
        self.spawn("upload", move |client| {
            let result = upload_and_decode(client, &file);
            WorkerEvent::Uploaded {
                generation,
                file,
                result,
            }
        })
    }

    pub fn predict(&self, generation: u64, file: SelectedFile) -> Result<(), ApiError> {
        self.spawn("predict", move |client| WorkerEvent::Predicted {
            generation,
            result: client.predict(&file),
        })
    }

    pub fn save(&self, request: SaveRequest) -> Result<(), ApiError> {
        self.spawn("save", move |client| WorkerEvent::Saved {
            result: client.save(&request),
        })
    }

    /// Drains every finished request without blocking.
    pub fn poll(&self) -> Vec<WorkerEvent> {
        self.rx.try_iter().collect()
    }

    /// Starts `task` on a named thread. Fails only when the thread cannot be
    /// created, in which case no event will ever arrive for it.
    fn spawn<F>(&self, name: &str, task: F) -> Result<(), ApiError>
    where
        F: FnOnce(&ApiClient) -> WorkerEvent + Send + 'static,
    {
        let client = self.client.clone();
        let ctx = self.ctx.clone();
        let tx = self.tx.clone();
        std::thread::Builder::new()
            .name(format!("{name}-request"))
            .spawn(move || {
                let event = task(&client);
                let _ = tx.send(event);
                ctx.request_repaint();
            })
            .map(|_| ())
            .map_err(ApiError::Spawn)
    }

    #[cfg(test)]
    fn recv_timeout(&self, timeout: std::time::Duration) -> Option<WorkerEvent> {
        self.rx.recv_timeout(timeout).ok()
    }
}

fn upload_and_decode(client: &ApiClient, file: &SelectedFile) -> Result<UploadedImage, ApiError> {
    let reply = client.upload(file)?;
    let image = image::load_from_memory(&file.bytes)?.to_rgba8();
    let remote_size = reply.width.zip(reply.height).map(|(w, h)| [w, h]);
    if let Some([w, h]) = remote_size {
        if [w, h] != [image.width(), image.height()] {
            log::warn!(
                "Server stored {} at {}x{}, local decode is {}x{}",
                reply.filename,
                w,
                h,
                image.width(),
                image.height()
            );
        }
    }
    Ok(UploadedImage {
        image,
        remote_name: reply.filename,
        remote_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    fn unreachable_worker() -> Worker {
        // Nothing listens on the discard port in the test environment.
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        Worker::new(client, egui::Context::default())
    }

    fn file() -> SelectedFile {
        SelectedFile {
            path: PathBuf::from("form.png"),
            name: "form.png".into(),
            bytes: Arc::from(vec![0u8; 4]),
        }
    }

    #[test]
    fn failed_upload_reports_back() {
        let worker = unreachable_worker();
        worker.upload(7, file()).unwrap();
        match worker.recv_timeout(Duration::from_secs(10)) {
            Some(WorkerEvent::Uploaded {
                generation, result, ..
            }) => {
                assert_eq!(generation, 7);
                assert!(matches!(result, Err(ApiError::Transport(_))));
            }
            _ => panic!("expected an upload event"),
        }
    }

    #[test]
    fn failed_predict_reports_back() {
        let worker = unreachable_worker();
        worker.predict(3, file()).unwrap();
        match worker.recv_timeout(Duration::from_secs(10)) {
            Some(WorkerEvent::Predicted { generation, result }) => {
                assert_eq!(generation, 3);
                assert!(result.is_err());
            }
            _ => panic!("expected a predict event"),
        }
    }

    #[test]
    fn poll_is_empty_when_idle() {
        assert!(unreachable_worker().poll().is_empty());
    }
}

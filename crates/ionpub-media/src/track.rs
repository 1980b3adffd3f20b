//! Local tracks published to the SFU
//!
//! A [`FileTrack`] replays an IVF (VP8) or Ogg (Opus) file into a `TrackLocalStaticSample`,
//! one sample per frame period, until it is stopped.

use async_trait::async_trait;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;
use webrtc::media::io::ivf_reader::IVFReader;
use webrtc::media::io::ogg_reader::OggReader;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::codec::{MediaCodec, OGG_PAGE_DURATION};

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("track {id} did not stop cleanly: {message}")]
    Stop { id: String, message: String },
}

/// Handle to a locally produced media stream
///
/// The session borrows it to attach to negotiation and to stop it on shutdown.
#[async_trait]
pub trait LocalTrack: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> RTPCodecType;

    /// Track handed to the peer connection
    fn rtp_track(&self) -> Arc<dyn TrackLocal + Send + Sync>;

    /// Stop producing samples; calling it again is a no-op
    async fn stop(&self) -> Result<(), MediaError>;
}

enum SampleReader {
    Ivf {
        reader: IVFReader<BufReader<File>>,
        frame_duration: Duration,
    },
    Ogg {
        reader: OggReader<BufReader<File>>,
        last_granule: u64,
    },
}

impl SampleReader {
    fn open(path: &Path, codec: MediaCodec) -> Result<Self, MediaError> {
        let file = File::open(path).map_err(|source| MediaError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_error = |message: String| MediaError::Parse {
            path: path.to_path_buf(),
            message,
        };

        match codec {
            MediaCodec::Vp8 => {
                let (reader, header) =
                    IVFReader::new(BufReader::new(file)).map_err(|e| parse_error(e.to_string()))?;
                if header.timebase_denominator == 0 {
                    return Err(parse_error("zero timebase denominator".to_string()));
                }
                let millis = 1000 * u64::from(header.timebase_numerator)
                    / u64::from(header.timebase_denominator);
                Ok(SampleReader::Ivf {
                    reader,
                    frame_duration: Duration::from_millis(millis.max(1)),
                })
            }
            MediaCodec::Opus => {
                let (reader, _header) = OggReader::new(BufReader::new(file), true)
                    .map_err(|e| parse_error(e.to_string()))?;
                Ok(SampleReader::Ogg {
                    reader,
                    last_granule: 0,
                })
            }
        }
    }

    fn period(&self) -> Duration {
        match self {
            SampleReader::Ivf { frame_duration, .. } => *frame_duration,
            SampleReader::Ogg { .. } => OGG_PAGE_DURATION,
        }
    }

    fn next_sample(&mut self) -> Result<Sample, String> {
        match self {
            SampleReader::Ivf {
                reader,
                frame_duration,
            } => {
                let (frame, _) = reader.parse_next_frame().map_err(|e| e.to_string())?;
                Ok(Sample {
                    data: frame.freeze(),
                    duration: *frame_duration,
                    ..Default::default()
                })
            }
            SampleReader::Ogg {
                reader,
                last_granule,
            } => {
                let (page, header) = reader.parse_next_page().map_err(|e| e.to_string())?;
                Ok(Sample {
                    data: page.freeze(),
                    duration: ogg_page_duration(header.granule_position, last_granule),
                    ..Default::default()
                })
            }
        }
    }
}

/// Granule position of a page on which no packet completes
const NO_GRANULE: u64 = u64::MAX;

/// Play-out time of an Ogg page from its granule position (48 kHz samples)
fn ogg_page_duration(granule_position: u64, last_granule: &mut u64) -> Duration {
    if granule_position == NO_GRANULE {
        return Duration::ZERO;
    }

    let sample_count = granule_position.saturating_sub(*last_granule);
    *last_granule = granule_position;
    Duration::from_millis(sample_count.saturating_mul(1000) / 48_000)
}

/// File-backed local track
pub struct FileTrack {
    id: String,
    codec: MediaCodec,
    track: Arc<TrackLocalStaticSample>,
    stop_tx: watch::Sender<bool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl FileTrack {
    /// Replay a VP8 IVF file. Must be called from within a Tokio runtime.
    pub fn video_ivf(
        path: impl AsRef<Path>,
        stream_id: &str,
        looping: bool,
    ) -> Result<Self, MediaError> {
        Self::open(path.as_ref(), MediaCodec::Vp8, stream_id, looping)
    }

    /// Replay an Opus Ogg file. Must be called from within a Tokio runtime.
    pub fn audio_ogg(
        path: impl AsRef<Path>,
        stream_id: &str,
        looping: bool,
    ) -> Result<Self, MediaError> {
        Self::open(path.as_ref(), MediaCodec::Opus, stream_id, looping)
    }

    fn open(
        path: &Path,
        codec: MediaCodec,
        stream_id: &str,
        looping: bool,
    ) -> Result<Self, MediaError> {
        let reader = SampleReader::open(path, codec)?;

        let id = Uuid::new_v4().to_string();
        let track = Arc::new(TrackLocalStaticSample::new(
            codec.capability(),
            id.clone(),
            stream_id.to_string(),
        ));

        let (stop_tx, stop_rx) = watch::channel(false);
        let pump = tokio::spawn(pump_samples(
            id.clone(),
            path.to_path_buf(),
            codec,
            looping,
            reader,
            track.clone(),
            stop_rx,
        ));

        tracing::info!("Opened {:?} track {} from {:?}", codec, id, path);

        Ok(Self {
            id,
            codec,
            track,
            stop_tx,
            pump: Mutex::new(Some(pump)),
        })
    }
}

#[async_trait]
impl LocalTrack for FileTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> RTPCodecType {
        self.codec.kind()
    }

    fn rtp_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.track.clone()
    }

    async fn stop(&self) -> Result<(), MediaError> {
        self.stop_tx.send_replace(true);

        let Some(pump) = self.pump.lock().await.take() else {
            return Ok(());
        };

        pump.await.map_err(|e| MediaError::Stop {
            id: self.id.clone(),
            message: e.to_string(),
        })?;

        tracing::debug!("Track {} stopped", self.id);
        Ok(())
    }
}

async fn pump_samples(
    id: String,
    path: PathBuf,
    codec: MediaCodec,
    looping: bool,
    mut reader: SampleReader,
    track: Arc<TrackLocalStaticSample>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(reader.period());

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        let sample = match reader.next_sample() {
            Ok(sample) => sample,
            Err(e) if looping => {
                tracing::debug!("Track {} reached end of {:?} ({}), rewinding", id, path, e);
                match SampleReader::open(&path, codec) {
                    Ok(rewound) => {
                        reader = rewound;
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Track (ID: {}) ended with error: {}", id, e);
                        break;
                    }
                }
            }
            Err(e) => {
                tracing::info!("Track (ID: {}) ended: {}", id, e);
                break;
            }
        };

        if let Err(e) = track.write_sample(&sample).await {
            tracing::warn!("Track (ID: {}) ended with error: {}", id, e);
            break;
        }
    }
}

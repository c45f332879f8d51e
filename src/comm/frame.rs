//! Wire frames and message types
//!
//! JSON-over-newline protocol: each frame is a single line of JSON followed
//! by `\n`. A frame is addressed `{src, dst}` and tagged with the channel
//! it belongs to; point-to-point delivery between a fixed (sender,
//! receiver, tag) triple is in send order.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::error::CommError;
use crate::model::signal::SignalKey;
use crate::model::{ChunkId, ProbeKey, Tensor};
use crate::operator::OperatorSpec;

/// Position of a process in the merged communication group. The
/// coordinator is rank 0; workers are ranks `1..=N`.
pub type Rank = u32;

/// Channel tags: one for configuration/control traffic, one for step-time
/// signal exchange, one for probe gathering, one for barriers. Tags keep
/// the channels independent; a receive on one tag never consumes traffic
/// from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    Control,
    Exchange,
    Gather,
    Barrier,
}

/// Configuration/control messages, sent point-to-point from the
/// coordinator to one worker on the control tag, applied in send order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// First message after spawn: the worker's chunk identity and the
    /// global timestep. `coordinator_chunk` names the chunk hosted on the
    /// coordinator itself, if any, so peer ids can be routed to rank 0.
    Init {
        #[serde(rename = "chunk-id")]
        chunk_id: ChunkId,
        label: String,
        dt: f64,
        #[serde(rename = "coordinator-chunk")]
        coordinator_chunk: Option<ChunkId>,
    },

    AddSignal {
        key: SignalKey,
        label: String,
        data: Tensor,
    },

    AddOperator {
        spec: OperatorSpec,
    },

    AddProbe {
        #[serde(rename = "probe-key")]
        probe_key: ProbeKey,
        #[serde(rename = "signal-key")]
        signal_key: SignalKey,
        period: u64,
    },

    /// Execute this many steps, then report at the barrier.
    RunSteps {
        steps: u64,
    },

    /// Stream every probe's accumulated samples on the gather tag, then
    /// report at the barrier.
    GatherProbes,

    /// Exit the worker loop and tear down.
    Stop,
}

/// Frame payloads, one enum per tag family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Body {
    /// Worker -> coordinator, first frame on a new link.
    Hello { rank: Rank },

    /// Coordinator -> worker, completes the join handshake.
    Welcome { world: u32 },

    /// Control-tag payload.
    Control { msg: ControlMessage },

    /// Exchange-tag payload: one signal's current value for this step.
    /// The embedded key lets the receiver assert it got the value it was
    /// waiting for.
    Signal { key: SignalKey, data: Tensor },

    /// Gather-tag payload: one probe's key and full sample sequence.
    ProbeData {
        #[serde(rename = "probe-key")]
        probe_key: ProbeKey,
        samples: Vec<Tensor>,
    },

    /// Barrier-tag payloads.
    BarrierReached,
    BarrierRelease,
}

/// One addressed, tagged message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub src: Rank,
    pub dst: Rank,
    pub tag: Tag,
    pub body: Body,
}

/// Write one frame as a JSON line.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), CommError>
where
    W: AsyncWrite + Unpin,
{
    let line = serde_json::to_string(frame)?;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. Returns `None` on a cleanly closed link.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, CommError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Ok(None);
    }
    let frame: Frame = serde_json::from_str(line.trim())?;
    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_stop_serialize() {
        let msg = ControlMessage::Stop;
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"Stop"}"#);
    }

    #[test]
    fn test_run_steps_serialize() {
        let msg = ControlMessage::RunSteps { steps: 10 };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"RunSteps","steps":10}"#);
    }

    #[test]
    fn test_add_probe_field_names() {
        let msg = ControlMessage::AddProbe {
            probe_key: 7,
            signal_key: 3,
            period: 2,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("probe-key"));
        assert!(json.contains("signal-key"));
    }

    #[test]
    fn test_frame_roundtrip() {
        let frame = Frame {
            src: 1,
            dst: 2,
            tag: Tag::Exchange,
            body: Body::Signal {
                key: 42,
                data: Tensor::vector(vec![1.0, 2.0]),
            },
        };
        let json = serde_json::to_string(&frame).unwrap();
        let back: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, back);
    }

    #[tokio::test]
    async fn test_write_read_frame() {
        let (mut client, server) = tokio::io::duplex(1024);
        let frame = Frame {
            src: 0,
            dst: 1,
            tag: Tag::Control,
            body: Body::Control {
                msg: ControlMessage::RunSteps { steps: 3 },
            },
        };
        write_frame(&mut client, &frame).await.unwrap();
        drop(client);

        let mut reader = tokio::io::BufReader::new(server);
        let got = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(got, frame);
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[test]
    fn test_all_control_messages_roundtrip() {
        let messages = vec![
            ControlMessage::Init {
                chunk_id: 0,
                label: "Chunk 0".to_string(),
                dt: 0.001,
                coordinator_chunk: None,
            },
            ControlMessage::AddSignal {
                key: 1,
                label: "sig".to_string(),
                data: Tensor::scalar(0.0),
            },
            ControlMessage::AddOperator {
                spec: OperatorSpec::Reset { dst: 1, value: 5.0 },
            },
            ControlMessage::AddProbe {
                probe_key: 2,
                signal_key: 1,
                period: 1,
            },
            ControlMessage::RunSteps { steps: 100 },
            ControlMessage::GatherProbes,
            ControlMessage::Stop,
        ];

        for msg in messages {
            let json = serde_json::to_string(&msg).unwrap();
            let back: ControlMessage = serde_json::from_str(&json).unwrap();
            assert_eq!(msg, back);
        }
    }
}

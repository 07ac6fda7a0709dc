//! Responder side of one inbound stream.
//!
//! ```text
//! resolve protocol ──unknown──► InvalidRequest chunk, close
//!        │
//! read request ──malformed──► InvalidRequest chunk, close
//!        │
//! handler(request, ctx) ──err──► error chunk after any chunks already sent
//!        │
//! close stream
//! ```

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::{HandlerRegistry, ResponseContext};
use crate::compression::{self, Compression, NoCompression};
use crate::config::ReqRespConfig;
use crate::error::{ReqRespError, Result};
use crate::protocol::{read_request, ProtocolId, ResultCode};
use crate::writer::{spawn_response_writer, write_response, ResponseItem};

/// Serve one inbound stream opened on `protocol`.
///
/// Returns the number of chunks written. The stream is closed on every path.
pub async fn serve_inbound<S>(
    stream: S,
    protocol: ProtocolId,
    registry: Arc<HandlerRegistry>,
    config: &ReqRespConfig,
) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut read_half, mut write_half) = tokio::io::split(stream);

    let Some(route) = registry.resolve(&protocol) else {
        warn!(protocol = %protocol, "inbound request on unknown protocol");
        let compression = compression_for(&protocol);
        let item = ResponseItem::Error(
            ResultCode::InvalidRequest,
            format!("unsupported protocol {}", protocol),
        );
        write_response(
            &mut write_half,
            [item],
            compression.as_ref(),
            config.max_error_message_len,
        )
        .await?;
        return Err(ReqRespError::InvalidRequest(format!(
            "unknown protocol {}",
            protocol
        )));
    };

    let request = match read_request(
        &mut read_half,
        config.max_request_size,
        route.compression.as_ref(),
    )
    .await
    {
        Ok(request) => request,
        Err(e) => {
            warn!(protocol = %protocol, error = %e, "malformed inbound request");
            let item = ResponseItem::Error(ResultCode::InvalidRequest, e.to_string());
            write_response(
                &mut write_half,
                [item],
                route.compression.as_ref(),
                config.max_error_message_len,
            )
            .await?;
            return Err(ReqRespError::MalformedRequest(e));
        }
    };

    let (sender, writer_task) =
        spawn_response_writer(write_half, route.compression.clone(), config.writer_config());
    let ctx = ResponseContext::with_sender(protocol.clone(), sender.clone());

    let outcome = route.handler.call(&request, ctx.clone()).await;
    if let Err(e) = &outcome {
        let chunks = ctx.chunks_sent();
        warn!(protocol = %protocol, chunks, error = %e, "request handler failed");
        // A failed handler always ends with an error chunk, even after partial output.
        let code = match e {
            ReqRespError::MalformedRequest(_) | ReqRespError::InvalidRequest(_) => {
                ResultCode::InvalidRequest
            }
            _ => ResultCode::ServerError,
        };
        if let Err(send_err) = sender.send(ResponseItem::Error(code, e.to_string())).await {
            warn!(
                protocol = %protocol,
                chunk_index = chunks,
                error = %send_err,
                "failed to send error chunk"
            );
        }
    }
    drop(ctx);
    drop(sender);

    let written = writer_task
        .await
        .map_err(|e| ReqRespError::Transport(format!("writer task failed: {}", e)))??;
    debug!(protocol = %protocol, chunks = written, "inbound request served");
    outcome.map(|()| written)
}

/// Compression implied by a raw protocol suffix, identity if none matches.
fn compression_for(protocol: &ProtocolId) -> Arc<dyn Compression> {
    compression::all()
        .into_iter()
        .find(|c| {
            c.protocol_suffix()
                .is_some_and(|suffix| protocol.as_str().ends_with(suffix))
        })
        .unwrap_or_else(|| Arc::new(NoCompression))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::SnappyCompression;
    use crate::protocol::{encode_request, read_chunk_header, read_payload, MethodDescriptor};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    const ECHO: MethodDescriptor = MethodDescriptor::ssz("echo", 1);

    /// Request value that makes the echo handler fail after one chunk.
    const FAIL_AFTER_ONE: u64 = 1_000;

    fn registry() -> Arc<HandlerRegistry> {
        let mut registry = HandlerRegistry::new();
        registry.register(ECHO, |n: u64, ctx: ResponseContext| async move {
            if n == 0 {
                return Err(ReqRespError::Transport("backend down".into()));
            }
            if n == FAIL_AFTER_ONE {
                ctx.respond(&0u64).await?;
                return Err(ReqRespError::Transport("database went away".into()));
            }
            for i in 0..n {
                ctx.respond(&i).await?;
            }
            Ok(())
        });
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_serves_chunks_then_closes() {
        let (mut client, server) = duplex(4096);
        let protocol = ProtocolId::new(&ECHO, &SnappyCompression);
        let task = tokio::spawn(async move {
            let config = ReqRespConfig::default();
            serve_inbound(server, protocol, registry(), &config).await
        });

        let request = encode_request(&3u64.to_le_bytes(), &SnappyCompression).unwrap();
        client.write_all(&request).await.unwrap();

        for i in 0..3u64 {
            let (code, size) = read_chunk_header(&mut client).await.unwrap().unwrap();
            assert!(code.is_success());
            let payload = read_payload(&mut client, size, 64, &SnappyCompression)
                .await
                .unwrap();
            assert_eq!(&payload[..], &i.to_le_bytes());
        }
        assert!(read_chunk_header(&mut client).await.unwrap().is_none());
        assert_eq!(task.await.unwrap().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unknown_protocol_gets_invalid_request() {
        let (mut client, server) = duplex(4096);
        let protocol = ProtocolId::from_raw("/eth2/beacon_chain/req/nope/1/ssz");
        let config = ReqRespConfig::default();
        let err = serve_inbound(server, protocol, registry(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ReqRespError::InvalidRequest(_)));

        let (code, _) = read_chunk_header(&mut client).await.unwrap().unwrap();
        assert_eq!(code, ResultCode::InvalidRequest);
    }

    #[tokio::test]
    async fn test_handler_failure_becomes_server_error() {
        let (mut client, server) = duplex(4096);
        let protocol = ProtocolId::new(&ECHO, &NoCompression);
        let request = encode_request(&0u64.to_le_bytes(), &NoCompression).unwrap();
        client.write_all(&request).await.unwrap();

        let config = ReqRespConfig::default();
        let err = serve_inbound(server, protocol, registry(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ReqRespError::Transport(_)));

        let (code, size) = read_chunk_header(&mut client).await.unwrap().unwrap();
        assert_eq!(code, ResultCode::ServerError);
        let message = read_payload(&mut client, size, 256, &NoCompression)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&message).contains("backend down"));
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_failure_after_partial_output_ends_with_error_chunk() {
        let (mut client, server) = duplex(4096);
        let protocol = ProtocolId::new(&ECHO, &NoCompression);
        let request = encode_request(&FAIL_AFTER_ONE.to_le_bytes(), &NoCompression).unwrap();
        client.write_all(&request).await.unwrap();

        let config = ReqRespConfig::default();
        let err = serve_inbound(server, protocol, registry(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ReqRespError::Transport(_)));

        let (code, size) = read_chunk_header(&mut client).await.unwrap().unwrap();
        assert_eq!(code, ResultCode::Success);
        read_payload(&mut client, size, 64, &NoCompression).await.unwrap();

        let (code, size) = read_chunk_header(&mut client).await.unwrap().unwrap();
        assert_eq!(code, ResultCode::ServerError);
        let message = read_payload(&mut client, size, 256, &NoCompression)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&message).contains("database went away"));
        assert!(read_chunk_header(&mut client).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_request_rejected() {
        let (mut client, server) = duplex(4096);
        let protocol = ProtocolId::new(&ECHO, &NoCompression);
        // Declares 100 bytes against a 16 byte limit.
        client.write_all(&[100]).await.unwrap();

        let config = ReqRespConfig {
            max_request_size: 16,
            ..ReqRespConfig::default()
        };
        let err = serve_inbound(server, protocol, registry(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ReqRespError::MalformedRequest(_)));

        let (code, _) = read_chunk_header(&mut client).await.unwrap().unwrap();
        assert_eq!(code, ResultCode::InvalidRequest);
    }

    #[test]
    fn test_compression_for_suffix() {
        let snappy = ProtocolId::from_raw("/eth2/beacon_chain/req/x/1/ssz_snappy");
        assert_eq!(compression_for(&snappy).name(), "snappy");
        let plain = ProtocolId::from_raw("/eth2/beacon_chain/req/x/1/ssz");
        assert_eq!(compression_for(&plain).name(), "none");
    }
}

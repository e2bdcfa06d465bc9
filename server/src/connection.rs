use crate::{Service, WorkerContext};
use crow_http::{
    CONTINUE_RESPONSE, Error, HeadContext, Method, Request, RequestParser, Response, Status,
    Transport, Version, encode_head, finalize, response_has_body,
};
use futures_lite::{AsyncReadExt, AsyncWriteExt};
use std::{io, sync::Arc};

/// Serve one connection to completion.
///
/// The per-socket state machine: read into a fixed buffer, feed the parser,
/// send `100 Continue` when asked, dispatch the parsed request to the
/// service, wait out a deferred completion, write the response, and either
/// loop for the next request or close. One request is in flight at a time;
/// bytes read past a message boundary are kept for the next iteration, and
/// a protocol upgrade hands the transport (plus those bytes) to the
/// service.
///
/// The idle timer is armed while reading and cancelled once a full request
/// has arrived; expiry shuts the socket down from the timer task and is
/// never reported to the handler. Reads at a message boundary are
/// interrupted by server shutdown, so idle keep-alive connections drain
/// promptly while a request already in flight runs to completion. The
/// connection is destroyed when this function returns, which can only
/// happen with no read or write pending.
pub async fn serve<S: Service, T: Transport>(service: Arc<S>, mut transport: T, ctx: WorkerContext) {
    let remote_ip = transport.peer_addr().unwrap_or_default();
    let mut parser = RequestParser::new()
        .with_max_head_len(ctx.http_config.max_head_len)
        .with_lenient(ctx.http_config.lenient_parsing);
    let mut buf = vec![0u8; ctx.http_config.read_buffer_len];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let timer_transport = transport.clone();
        let timer_id = ctx.timer.schedule(u64::from(ctx.timeout), move || {
            log::debug!("connection idle timeout expired");
            timer_transport.shutdown();
        });
        let mut sent_continue = false;
        let mut message_started = !pending.is_empty();

        loop {
            if !pending.is_empty() {
                match parser.feed(&pending) {
                    Ok(consumed) => {
                        if consumed > 0 {
                            message_started = true;
                        }
                        pending.drain(..consumed);
                    }
                    Err(error) => {
                        // malformed request: close without attempting a
                        // response
                        log::debug!("unparseable request ({error}), closing connection");
                        ctx.timer.cancel(timer_id);
                        transport.shutdown();
                        return;
                    }
                }
            }

            if parser.is_message_complete() {
                break;
            }

            if parser.headers_complete() && parser.needs_continue() && !sent_continue {
                sent_continue = true;
                if transport.write_all(CONTINUE_RESPONSE).await.is_err() {
                    ctx.timer.cancel(timer_id);
                    return;
                }
            }

            let read = if message_started {
                transport.read(&mut buf).await
            } else {
                match ctx.swansong.interrupt(transport.read(&mut buf)).await {
                    Some(read) => read,
                    None => {
                        // shutting down between requests
                        ctx.timer.cancel(timer_id);
                        transport.shutdown();
                        return;
                    }
                }
            };

            match read {
                Ok(0) => {
                    ctx.timer.cancel(timer_id);
                    return;
                }
                Ok(n) => pending.extend_from_slice(&buf[..n]),
                Err(error) => {
                    log::debug!("read error: {error}");
                    ctx.timer.cancel(timer_id);
                    return;
                }
            }
        }
        ctx.timer.cancel(timer_id);

        let upgrade = parser.upgrade();
        let mut req = parser.take_request(remote_ip.clone());

        if req.version() == Version::Http1_1 && req.host().is_none() {
            let mut res = Response::new();
            res.set_status(Status::BadRequest);
            let _ = write_response(&mut transport, &req, res, false, &ctx).await;
            transport.shutdown();
            return;
        }

        if upgrade {
            if service.wants_upgrade(&req) {
                let leftover = std::mem::take(&mut pending);
                service
                    .upgrade(req, transport, leftover, ctx.swansong.clone())
                    .await;
                return;
            }
            let mut res = Response::new();
            res.set_status(Status::NotFound);
            let _ = write_response(&mut transport, &req, res, false, &ctx).await;
            transport.shutdown();
            return;
        }

        let mut res = Response::new();
        service.handle(&mut req, &mut res).await;

        if !res.is_completed() {
            if res.is_deferred() {
                res.wait_for_deferral().await;
            } else {
                log::trace!("handler returned without end(), completing response");
                res.end();
            }
        }

        let keep_alive = req.keep_alive() && !req.close_connection();
        if let Err(error) = write_response(&mut transport, &req, res, keep_alive, &ctx).await {
            log::debug!("write error: {error}");
            return;
        }

        if !keep_alive {
            transport.shutdown();
            return;
        }
    }
}

/// Write one response.
///
/// Below the stream threshold the head and body go out as one buffered
/// write. At or above it, the head is written first and the body follows in
/// fixed-size blocks, as does an attached static file.
async fn write_response<T: Transport>(
    transport: &mut T,
    req: &Request,
    mut res: Response,
    keep_alive: bool,
    ctx: &WorkerContext,
) -> crow_http::Result<()> {
    let date = ctx.date.get();
    let head_ctx = HeadContext {
        version: req.version(),
        keep_alive,
        server_name: &ctx.server_name,
        date: &date,
        host: req.host(),
        secure: false,
    };

    finalize(&mut res, &head_ctx);
    let head = encode_head(&res, &head_ctx);
    let has_body = response_has_body(req.method() == Method::Head, res.status());
    let file = res.take_static_file();

    match file {
        Some(file) if has_body => {
            transport.write_all(&head).await?;
            let mut reader = std::fs::File::open(file.path())
                .map_err(|_| Error::StaticFile(file.path().display().to_string()))?;
            let mut block = vec![0u8; ctx.http_config.write_block_len];
            loop {
                let n = io::Read::read(&mut reader, &mut block)?;
                if n == 0 {
                    break;
                }
                transport.write_all(&block[..n]).await?;
            }
        }
        _ if !has_body || res.body().len() < ctx.http_config.stream_threshold => {
            let mut out = head;
            if has_body {
                out.extend_from_slice(res.body());
            }
            transport.write_all(&out).await?;
        }
        _ => {
            transport.write_all(&head).await?;
            for chunk in res.body().chunks(ctx.http_config.write_block_len) {
                transport.write_all(chunk).await?;
            }
        }
    }

    Ok(transport.flush().await?)
}

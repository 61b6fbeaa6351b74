use shiftwatch_daemon::server::run_socket_server_with_error;
use shiftwatch_daemon::DaemonPaths;
use shiftwatch_supervisor::{Event, OutputTap};
use tokio::sync::{mpsc, oneshot};

use crate::protocol::{Request, Response};

/// Serve the control socket. Returns only if the socket cannot be bound.
pub async fn serve(paths: DaemonPaths, tx: mpsc::UnboundedSender<Event>, output: OutputTap) {
	run_socket_server_with_error(
		&paths,
		move |req: Request| {
			let tx = tx.clone();
			let output = output.clone();
			async move { handle_request(req, &tx, &output).await }
		},
		Some(|message: String| Response::Error { message }),
	)
	.await;
}

pub async fn handle_request(
	request: Request,
	tx: &mpsc::UnboundedSender<Event>,
	output: &OutputTap,
) -> Response {
	match request {
		Request::Ping => Response::Pong,
		Request::Status => {
			let (reply, answer) = oneshot::channel();
			if tx.send(Event::Query(reply)).is_err() {
				return stopped();
			}
			match answer.await {
				Ok(snapshot) => Response::Status { snapshot },
				Err(_) => stopped(),
			}
		}
		Request::Restart => match tx.send(Event::RestartNow) {
			Ok(()) => Response::Ok {
				message: Some("restarting worker".to_string()),
			},
			Err(_) => stopped(),
		},
		Request::Logs { lines } => Response::Log {
			lines: output.tail(lines).await,
		},
		Request::Shutdown => match tx.send(Event::Shutdown) {
			Ok(()) => Response::Ok {
				message: Some("shutting down".to_string()),
			},
			Err(_) => stopped(),
		},
	}
}

fn stopped() -> Response {
	Response::Error {
		message: "supervisor is shutting down".to_string(),
	}
}

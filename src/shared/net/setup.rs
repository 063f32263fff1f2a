use crate::shared::net::traits::*;
use crate::shared::net::udp_server::*;
use std::sync::{atomic, mpsc, Arc};
use std::{net, thread};

/// Setup and start the UDP dns server. The server runs in its own thread;
/// when it errors or exits the current thread is notified so callers can
/// react (e.g. a CLI `main` returning after a fatal bind error).
pub fn start_servers<H: DnsHandler>(handler: Arc<H>, udp_params: UdpParams) {
    let (tx, rx) = mpsc::channel();
    let stop = Arc::new(atomic::AtomicBool::new(false));

    let udp_params_clone = udp_params.clone();
    let handler_clone = Arc::clone(&handler);
    let stop_clone = Arc::clone(&stop);
    thread::spawn(move || {
        start_udp_server(handler_clone, udp_params_clone, &stop_clone);
        log::warn!("UDP server shut down.");
        tx.send(()).unwrap();
    });

    // Wait for the server to exit. A timeout on the second recv would make
    // sense with a shutdown signal in place; none exists yet, so this simply
    // blocks until the server thread above terminates.
    rx.recv().unwrap();
    stop.store(true, atomic::Ordering::SeqCst);
    wake_up_server(&udp_params);
}

/// Dirty hack. The only way to interrupt the UDP `recv_from` call is sending
/// it a message. The call is blocking and without this hack the server cannot
/// unblock and check the stop signal (and so exit properly).
#[allow(unused_must_use)]
fn wake_up_server(udp_conf: &UdpParams) {
    let udp_server_addr: (&str, u16) = (&udp_conf.address, udp_conf.port);
    match net::UdpSocket::bind("0.0.0.0:0") {
        Ok(udp_sock) => udp_sock.send_to(&[0], udp_server_addr),
        Err(_) => return,
    };
}

use cyw43::{Control, NetDriver, PowerManagementMode};
use embassy_executor::{task, Spawner};
use embassy_futures::select::{select, Either};
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{
    Config, IpEndpoint, Ipv4Address, Ipv4Cidr, Stack, StackResources, StaticConfigV4,
};
use embassy_rp::gpio::Output;
use embassy_time::Delay;
use static_cell::StaticCell;

use super::{CONTROL_LOCK, OUTBOX, SAMPLER_LINK};
use crate::board::WifiSpi;
use crate::config::{
    AP_ADDRESS, AP_CHANNEL, AP_PASSPHRASE, AP_PREFIX_LEN, AP_SSID, RX_DATAGRAM_MAX, UDP_PORT,
};
use crate::transport::{DatagramSocket, ProtocolHandler, SocketError};

// CYW43439 firmware and CLM blobs, flashed separately:
//   probe-rs download 43439A0.bin     --binary-format bin --chip RP235x --base-address 0x10100000
//   probe-rs download 43439A0_clm.bin --binary-format bin --chip RP235x --base-address 0x10140000
const WIFI_FIRMWARE_ADDR: usize = 0x1010_0000;
const WIFI_FIRMWARE_LEN: usize = 230_321;
const WIFI_CLM_ADDR: usize = 0x1014_0000;
const WIFI_CLM_LEN: usize = 4_752;

const SOCKET_RX_LEN: usize = 1024;
// a few full data packets plus a reply
const SOCKET_TX_LEN: usize = 4096;
const SOCKET_META: usize = 8;

#[task]
pub async fn cyw43_task(runner: cyw43::Runner<'static, Output<'static>, WifiSpi>) -> ! {
    runner.run().await
}

#[task]
pub async fn net_task(mut runner: embassy_net::Runner<'static, NetDriver<'static>>) -> ! {
    runner.run().await
}

/// Powers up the radio, opens the WPA2 access point and returns the
/// network stack, statically addressed at [`AP_ADDRESS`].
pub async fn start_access_point(
    spawner: Spawner,
    pwr: Output<'static>,
    spi: WifiSpi,
) -> Stack<'static> {
    // SAFETY: both blobs live in flash outside the program image and are
    // never written at runtime.
    let (fw, clm) = unsafe {
        (
            core::slice::from_raw_parts(WIFI_FIRMWARE_ADDR as *const u8, WIFI_FIRMWARE_LEN),
            core::slice::from_raw_parts(WIFI_CLM_ADDR as *const u8, WIFI_CLM_LEN),
        )
    };

    static STATE: StaticCell<cyw43::State> = StaticCell::new();
    let state = STATE.init(cyw43::State::new());
    let (net_device, mut control, runner) = cyw43::new(state, pwr, spi, fw).await;
    spawner.must_spawn(cyw43_task(runner));

    control.init(clm).await;
    // power saving adds tens of ms of latency to every datagram
    control.set_power_management(PowerManagementMode::None).await;

    let [a, b, c, d] = AP_ADDRESS;
    let config = Config::ipv4_static(StaticConfigV4 {
        address: Ipv4Cidr::new(Ipv4Address::new(a, b, c, d), AP_PREFIX_LEN),
        gateway: None,
        dns_servers: heapless::Vec::new(),
    });

    static RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        net_device,
        config,
        RESOURCES.init(StackResources::new()),
        0x6d6f_6361_705f_6e64,
    );
    spawner.must_spawn(net_task(runner));

    open_access_point(&mut control).await;
    stack
}

async fn open_access_point(control: &mut Control<'static>) {
    control
        .start_ap_wpa2(AP_SSID, AP_PASSPHRASE, AP_CHANNEL)
        .await;
    let [a, b, c, d] = AP_ADDRESS;
    info!(
        "Access point \"{}\" up on channel {}, node at {}.{}.{}.{}:{}",
        AP_SSID, AP_CHANNEL, a, b, c, d, UDP_PORT
    );
}

/// [`DatagramSocket`] over an embassy-net UDP socket.
pub struct NetSocket<'a>(UdpSocket<'a>);

impl<'a> NetSocket<'a> {
    pub fn new(socket: UdpSocket<'a>) -> Self {
        Self(socket)
    }
}

impl DatagramSocket for NetSocket<'_> {
    type Endpoint = IpEndpoint;

    async fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, IpEndpoint), SocketError> {
        match self.0.recv_from(buf).await {
            Ok((len, meta)) => Ok((len, meta.endpoint)),
            Err(e) => {
                debug!("UDP receive error: {:?}", e);
                Err(SocketError::Receive)
            }
        }
    }

    async fn send_to(&mut self, data: &[u8], to: IpEndpoint) -> Result<(), SocketError> {
        self.0.send_to(data, to).await.map_err(|e| {
            debug!("UDP send error: {:?}", e);
            SocketError::Send
        })
    }

    async fn discard_pending(&mut self) -> usize {
        let mut scratch = [0u8; RX_DATAGRAM_MAX];
        let mut dropped = 0;
        loop {
            match select(self.0.recv_from(&mut scratch), core::future::ready(())).await {
                Either::First(_) => dropped += 1,
                Either::Second(()) => return dropped,
            }
        }
    }
}

/// Serves the control protocol on [`UDP_PORT`] and forwards sampled batches.
#[task]
pub async fn udp_task(stack: Stack<'static>) {
    let mut rx_meta = [PacketMetadata::EMPTY; SOCKET_META];
    let mut rx_buffer = [0u8; SOCKET_RX_LEN];
    let mut tx_meta = [PacketMetadata::EMPTY; SOCKET_META];
    let mut tx_buffer = [0u8; SOCKET_TX_LEN];

    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    if let Err(e) = socket.bind(UDP_PORT) {
        error!("Failed to bind UDP port {}: {:?}", UDP_PORT, e);
        return;
    }
    info!("UDP task listening on port {}", UDP_PORT);

    let mut socket = NetSocket::new(socket);
    let mut handler = ProtocolHandler::new(SAMPLER_LINK.client(), Delay, &CONTROL_LOCK, &OUTBOX);
    handler.run(&mut socket).await;
}

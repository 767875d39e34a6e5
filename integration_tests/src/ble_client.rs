//! Host-side NUS client used to drive the bridge over the air.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Nordic UART Service UUIDs
const NUS_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
const NUS_RX_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e); // Write to device
const NUS_TX_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e); // Notify from device

/// Largest write that fits the default ATT MTU
pub const DEFAULT_WRITE_LEN: usize = 20;

/// Connected NUS peer with a background notification collector.
pub struct BleClient {
    adapter: Adapter,
    peripheral: Peripheral,
    rx_char: Characteristic,
    tx_char: Characteristic,
    received: Arc<Mutex<Vec<u8>>>,
    /// Count of notifications seen, so tests can check chunking
    notifications: Arc<Mutex<usize>>,
}

impl BleClient {
    /// Scan for a device whose name starts with `prefix` and connect.
    pub async fn connect_by_prefix(prefix: &str, scan_timeout: Duration) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapters found"))?;

        adapter
            .start_scan(ScanFilter {
                services: vec![NUS_SERVICE_UUID],
            })
            .await?;
        let found = Self::find_device(&adapter, prefix, scan_timeout).await;
        adapter.stop_scan().await?;
        let peripheral = found?;

        Self::attach(adapter, peripheral).await
    }

    async fn find_device(adapter: &Adapter, prefix: &str, scan_timeout: Duration) -> Result<Peripheral> {
        let start = Instant::now();

        while start.elapsed() < scan_timeout {
            for peripheral in adapter.peripherals().await? {
                let Some(props) = peripheral.properties().await? else {
                    continue;
                };
                if props
                    .local_name
                    .as_deref()
                    .is_some_and(|name| name.starts_with(prefix))
                {
                    return Ok(peripheral);
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Err(anyhow!("No device named '{}*' found within timeout", prefix))
    }

    async fn attach(adapter: Adapter, peripheral: Peripheral) -> Result<Self> {
        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let characteristics = peripheral.characteristics();
        let find = |uuid: Uuid, what: &str| {
            characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or_else(|| anyhow!("NUS {} characteristic not found", what))
        };
        let rx_char = find(NUS_RX_UUID, "RX")?;
        let tx_char = find(NUS_TX_UUID, "TX")?;

        peripheral.subscribe(&tx_char).await?;

        let received = Arc::new(Mutex::new(Vec::new()));
        let notifications = Arc::new(Mutex::new(0));

        let mut stream = peripheral.notifications().await?;
        let sink = received.clone();
        let counter = notifications.clone();
        tokio::spawn(async move {
            while let Some(data) = stream.next().await {
                if data.uuid == NUS_TX_UUID {
                    sink.lock().await.extend_from_slice(&data.value);
                    *counter.lock().await += 1;
                }
            }
        });

        Ok(Self {
            adapter,
            peripheral,
            rx_char,
            tx_char,
            received,
            notifications,
        })
    }

    /// Bring a dropped link back up against the same peripheral.
    pub async fn reconnect(&mut self) -> Result<()> {
        *self = Self::attach(self.adapter.clone(), self.peripheral.clone()).await?;
        // Let the CCCD write land before callers expect traffic
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(())
    }

    /// Write `data` to the RX characteristic in writes of at most `chunk` bytes.
    pub async fn send(&self, data: &[u8], chunk: usize) -> Result<()> {
        for part in data.chunks(chunk.max(1)) {
            self.peripheral
                .write(&self.rx_char, part, WriteType::WithoutResponse)
                .await?;
        }
        Ok(())
    }

    /// Wait until `len` bytes have arrived by notification and take them.
    pub async fn receive(&self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let start = Instant::now();
        loop {
            {
                let mut buf = self.received.lock().await;
                if buf.len() >= len {
                    return Ok(buf.drain(..len).collect());
                }
                if start.elapsed() >= timeout {
                    anyhow::bail!(
                        "Timeout waiting for {} bytes over BLE, got {}",
                        len,
                        buf.len()
                    );
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Notifications received since the last `clear_buffer`.
    pub async fn notification_count(&self) -> usize {
        *self.notifications.lock().await
    }

    pub async fn clear_buffer(&self) {
        self.received.lock().await.clear();
        *self.notifications.lock().await = 0;
    }

    pub async fn disconnect(&self) -> Result<()> {
        // Already gone if the device dropped us
        let _ = self.peripheral.unsubscribe(&self.tx_char).await;
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

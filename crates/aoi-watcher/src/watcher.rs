//! FileWatcher (spec §4.8): a poll-based loop over the `processed_csv`
//! trees, not an inotify/fsevents watch — the teacher's own dependency
//! list only ever mentions `notify` in passing (see DESIGN.md), and
//! polling is what the specification actually describes. Dedup is a
//! `DashMap` of fingerprints so the tick loop and an on-demand rescan can
//! both touch it without a crate-wide lock (generalizing
//! `codegraph-ir`'s incremental-rescan fingerprint idiom).

use aoi_catalog::{DefaultCatalog, FilesystemScanner};
use aoi_config::AoiConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const CONFIG_RELOAD_INTERVAL: Duration = Duration::from_secs(60);

fn aoi_filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]+_([A-Z0-9]+)_\d{12}\.csv$").unwrap())
}

#[derive(Debug, Clone)]
pub enum WatcherEvent {
    FileFound { product_id: String, original_lot_id: String, station: String, path: PathBuf },
}

fn fingerprint(path: &Path, size: u64, mtime: i64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update(b"|");
    hasher.update(size.to_le_bytes().as_slice());
    hasher.update(b"|");
    hasher.update(mtime.to_le_bytes().as_slice());
    hasher.finalize().to_hex().to_string()
}

pub struct FileWatcher {
    config: Mutex<Arc<AoiConfig>>,
    config_path: Option<PathBuf>,
    catalog: Arc<DefaultCatalog>,
    seen: DashMap<String, ()>,
    last_full_rescan: Mutex<Instant>,
    events: broadcast::Sender<WatcherEvent>,
    running: AtomicBool,
}

impl FileWatcher {
    pub fn new(config: Arc<AoiConfig>, config_path: Option<PathBuf>, catalog: Arc<DefaultCatalog>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            config: Mutex::new(config),
            config_path,
            catalog,
            seen: DashMap::new(),
            last_full_rescan: Mutex::new(Instant::now() - Duration::from_secs(3600)),
            events,
            running: AtomicBool::new(false),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatcherEvent> {
        self.events.subscribe()
    }

    fn snapshot_config(&self) -> Arc<AoiConfig> {
        self.config.lock().clone()
    }

    /// Spawns the poll loop and, if a config path was supplied, a
    /// sibling hot-reload loop. Both run until the process exits; callers
    /// don't need to join them.
    pub fn spawn(self: &Arc<Self>) {
        let watcher = self.clone();
        tokio::spawn(async move { watcher.run_poll_loop().await });

        if self.config_path.is_some() {
            let watcher = self.clone();
            tokio::spawn(async move { watcher.run_reload_loop().await });
        }
    }

    async fn run_poll_loop(self: Arc<Self>) {
        self.running.store(true, Ordering::Relaxed);
        loop {
            let config = self.snapshot_config();
            let rescan_interval = Duration::from_secs(config.monitoring.rescan_interval);
            let scan_interval = Duration::from_secs(config.monitoring.scan_interval.max(1));

            let due_for_rescan = self.last_full_rescan.lock().elapsed() >= rescan_interval;
            if due_for_rescan {
                let scanner = FilesystemScanner::new(config.database.base_path.clone(), config.processing.station_order.clone());
                if let Err(err) = self.catalog.rescan_all(&scanner).await {
                    tracing::error!(error = %err, "full rescan failed");
                }
                *self.last_full_rescan.lock() = Instant::now();
            }

            self.light_scan(&config);
            tokio::time::sleep(scan_interval).await;
        }
    }

    async fn run_reload_loop(self: Arc<Self>) {
        let Some(path) = self.config_path.clone() else { return };
        loop {
            tokio::time::sleep(CONFIG_RELOAD_INTERVAL).await;
            match AoiConfig::from_file(&path) {
                Ok(reloaded) => *self.config.lock() = Arc::new(reloaded),
                Err(err) => tracing::warn!(error = %err, path = %path.display(), "config hot-reload failed, keeping previous config"),
            }
        }
    }

    /// Walks `<base>/<product>/processed_csv/<lot>/<station>/` looking for
    /// files whose name matches the AOI pattern. Errors inside one
    /// directory are logged and skipped; the scan always completes.
    fn light_scan(&self, config: &AoiConfig) {
        let base = Path::new(&config.database.base_path);
        let Ok(products) = std::fs::read_dir(base) else { return };
        for product_entry in products.filter_map(|e| e.ok()) {
            if !product_entry.path().is_dir() {
                continue;
            }
            let product_id = product_entry.file_name().to_string_lossy().to_string();
            let raw_root = product_entry.path().join("processed_csv");
            self.scan_raw_root(&product_id, &raw_root);
        }
    }

    fn scan_raw_root(&self, product_id: &str, raw_root: &Path) {
        let Ok(lot_dirs) = std::fs::read_dir(raw_root) else { return };
        for lot_entry in lot_dirs.filter_map(|e| e.ok()) {
            if !lot_entry.path().is_dir() {
                continue;
            }
            let lot_id = lot_entry.file_name().to_string_lossy().to_string();
            let Ok(station_dirs) = std::fs::read_dir(lot_entry.path()) else {
                tracing::warn!(path = %lot_entry.path().display(), "cannot read lot directory during light scan");
                continue;
            };
            for station_entry in station_dirs.filter_map(|e| e.ok()) {
                if !station_entry.path().is_dir() {
                    continue;
                }
                let station = station_entry.file_name().to_string_lossy().to_string();
                self.scan_station_dir(product_id, &lot_id, &station, &station_entry.path());
            }
        }
    }

    fn scan_station_dir(&self, product_id: &str, lot_id: &str, station: &str, dir: &Path) {
        let Ok(files) = std::fs::read_dir(dir) else {
            tracing::warn!(path = %dir.display(), "cannot read station directory during light scan");
            return;
        };
        for file_entry in files.filter_map(|e| e.ok()) {
            let path = file_entry.path();
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if !aoi_filename_pattern().is_match(filename) {
                continue;
            }
            let Ok(metadata) = file_entry.metadata() else { continue };
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            let fp = fingerprint(&path, metadata.len(), mtime);
            if self.seen.insert(fp, ()).is_some() {
                continue;
            }
            let _ = self.events.send(WatcherEvent::FileFound {
                product_id: product_id.to_string(),
                original_lot_id: lot_id.to_string(),
                station: station.to_string(),
                path,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aoi_catalog::JsonFileCatalogStore;

    fn config_text(base: &Path) -> String {
        format!(
            r#"{{
                "database": {{
                    "base_path": "{base}",
                    "structure": {{
                        "csv": "{{base}}/{{product}}/csv/{{lot}}/{{station}}/{{component}}.csv",
                        "org": "{{base}}/{{product}}/org/{{lot}}/{{station}}/{{component}}/",
                        "roi": "{{base}}/{{product}}/roi/{{lot}}/{{station}}/{{component}}/",
                        "map": "{{base}}/{{product}}/map/{{lot}}/{{station}}/{{component}}.png"
                    }}
                }},
                "processing": {{"station_order": ["MT"], "flip_config": {{}}, "station_recipe": {{}}, "station_logic": {{}}}},
                "defect_rules": {{"good": ["Good"], "bad": ["Scratch"]}},
                "monitoring": {{"scan_interval": 1, "rescan_interval": 3600}}
            }}"#,
            base = base.display()
        )
    }

    #[tokio::test]
    async fn light_scan_emits_each_fingerprint_once() {
        let dir = tempfile::tempdir().unwrap();
        let station_dir = dir.path().join("P1").join("processed_csv").join("L1").join("MT");
        std::fs::create_dir_all(&station_dir).unwrap();
        std::fs::write(station_dir.join("DEV_CMP001_202401010000.csv"), "Col,Row,DefectType\n1,1,ok\n").unwrap();

        let config = Arc::new(AoiConfig::from_str(&config_text(dir.path())).unwrap());
        let store = Arc::new(JsonFileCatalogStore::new(dir.path().join("catalog.json")));
        let catalog = Arc::new(DefaultCatalog::load(store).await.unwrap());
        let watcher = FileWatcher::new(config.clone(), None, catalog);
        let mut rx = watcher.subscribe();

        watcher.light_scan(&config);
        watcher.light_scan(&config);

        match rx.try_recv().unwrap() {
            WatcherEvent::FileFound { original_lot_id, station, .. } => {
                assert_eq!(original_lot_id, "L1");
                assert_eq!(station, "MT");
            }
        }
        assert!(rx.try_recv().is_err());
    }
}

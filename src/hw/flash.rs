//! Catalog cache in the nRF52840's internal flash.
//!
//! One `sequential-storage` map item holds the serialized catalog. The
//! map pages sit at the top of flash, outside the linker's FLASH region.

use bakery_kiosk::catalog::{BreadCatalog, CatalogCache, MAX_RECORD_SIZE};
use bakery_kiosk::config::{STORAGE_FLASH_PAGE_COUNT, STORAGE_FLASH_PAGE_START};
use core::ops::Range;
use defmt::{error, info};
use embedded_storage_async::nor_flash::NorFlash;
use sequential_storage::cache::NoCache;
use sequential_storage::map;

/// Flash page size for nRF52840 (4 KB).
const FLASH_PAGE_SIZE: u32 = 4096;

const STORAGE: Range<u32> = STORAGE_FLASH_PAGE_START * FLASH_PAGE_SIZE
    ..(STORAGE_FLASH_PAGE_START + STORAGE_FLASH_PAGE_COUNT) * FLASH_PAGE_SIZE;

const KEY_CATALOG: u8 = 0x01;

/// Room for the map's item header on top of the record.
const BUFFER_SIZE: usize = MAX_RECORD_SIZE + 32;

pub struct FlashCache<F> {
    flash: F,
}

impl<F: NorFlash> FlashCache<F> {
    pub fn new(flash: F) -> Self {
        Self { flash }
    }
}

impl<F: NorFlash> CatalogCache for FlashCache<F> {
    async fn load(&mut self) -> Option<BreadCatalog> {
        let mut buf = [0u8; BUFFER_SIZE];
        match map::fetch_item::<u8, &[u8], _>(
            &mut self.flash,
            STORAGE,
            &mut NoCache::new(),
            &mut buf,
            &KEY_CATALOG,
        )
        .await
        {
            Ok(Some(data)) => BreadCatalog::deserialize(data),
            Ok(None) => {
                info!("No catalog in flash");
                None
            }
            Err(e) => {
                error!("Flash read error: {:?}", defmt::Debug2Format(&e));
                None
            }
        }
    }

    async fn save(&mut self, catalog: &BreadCatalog) {
        let mut record = [0u8; MAX_RECORD_SIZE];
        let len = catalog.serialize(&mut record);
        let item = &record[..len];
        let mut buf = [0u8; BUFFER_SIZE];

        match map::store_item::<u8, &[u8], _>(
            &mut self.flash,
            STORAGE,
            &mut NoCache::new(),
            &mut buf,
            &KEY_CATALOG,
            &item,
        )
        .await
        {
            Ok(()) => info!("Catalog saved to flash"),
            Err(e) => error!("Flash write error: {:?}", defmt::Debug2Format(&e)),
        }
    }
}

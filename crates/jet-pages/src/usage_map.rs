use std::fmt;

use jet_format::{page_type, JetFormat};
use log::debug;

use crate::page_set::PageSet;
use crate::{PageChannel, PageError, Result};

/// Map type tag for a bitmap stored inline in the declaration row.
pub const MAP_TYPE_INLINE: u8 = 0x00;
/// Map type tag for a map whose bitmap lives on dedicated USAGE_MAP pages.
pub const MAP_TYPE_REFERENCE: u8 = 0x01;

/// The physical representation currently backing a [`UsageMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handler {
    /// Fixed-length bitmap inside the declaration row, covering pages
    /// `[start_page, start_page + L)`.
    Inline {
        /// Free-space maps treat every page outside the tracked range as
        /// "in the set"; adds out of range are then no-ops and removes
        /// beyond the end shift the window forward.
        assume_out_of_range_bits_on: bool,
    },
    /// Row holds pointers to dedicated USAGE_MAP pages; covers every
    /// addressable page from 0.
    Reference,
}

/// Which database pages a table (or the free-space pool) uses.
///
/// The logical state is a set of page numbers drawn from the half-open
/// range `[start_page, end_page)`. The physical representation is either
/// *inline* (a fixed-length bitmap inside the declaration row) or
/// *reference* (the row holds pointers to dedicated USAGE_MAP pages). An
/// inline map that can no longer cover its range shifts its start page or
/// promotes itself to the reference form; both transitions preserve the
/// page set.
///
/// Every mutation keeps the in-memory set and the on-disk bits in lock
/// step: the backing buffer is edited and the affected page is written
/// through the channel before the call returns.
pub struct UsageMap {
    format: JetFormat,
    /// Page number of the page containing the declaration row.
    table_page_num: u32,
    /// Bounds of the declaration row within `table_buffer`.
    row_start: usize,
    row_end: usize,
    /// Offset within the active buffer at which bitmap payload starts.
    /// For inline maps this points into `table_buffer`; for reference maps
    /// it is the USAGE_MAP page header length.
    start_offset: usize,
    /// Buffer holding the declaration page.
    table_buffer: Vec<u8>,
    start_page: u32,
    end_page: u32,
    /// Bit `i` set means page `start_page + i` is in the map.
    pages: PageSet,
    /// Bumped on every add/remove so cursors can detect mutation.
    mod_count: u32,
    handler: Handler,
    /// Most recently touched USAGE_MAP page (reference maps only), kept to
    /// avoid re-reading it on clustered updates.
    map_page_cache: Option<(u32, Vec<u8>)>,
}

impl UsageMap {
    /// Read a usage map from its declaration row.
    ///
    /// `row_start..row_end` bound the row within page `page_num`; locating
    /// the row is the caller's (table layer's) job. The first row byte
    /// selects the representation.
    pub fn read(
        channel: &mut dyn PageChannel,
        page_num: u32,
        row_start: usize,
        row_end: usize,
        format: JetFormat,
        assume_out_of_range_bits_on: bool,
    ) -> Result<UsageMap> {
        let mut table_buffer = vec![0u8; channel.page_size()];
        channel.read_page(page_num, &mut table_buffer)?;

        if row_start >= row_end || row_end > table_buffer.len() {
            return Err(PageError::Corrupt(format!(
                "usage map row bounds {row_start}..{row_end} outside page of {} bytes",
                table_buffer.len()
            )));
        }

        let map_type = table_buffer[row_start];
        debug!(
            "usage map declaration at page {page_num} rows {row_start}..{row_end}, type {map_type:#04x}"
        );

        let mut map = UsageMap {
            format,
            table_page_num: page_num,
            row_start,
            row_end,
            start_offset: row_start + format.offset_usage_map_start,
            table_buffer,
            start_page: 0,
            end_page: 0,
            pages: PageSet::new(),
            mod_count: 0,
            handler: Handler::Inline {
                assume_out_of_range_bits_on,
            },
            map_page_cache: None,
        };

        match map_type {
            MAP_TYPE_INLINE => map.init_inline(assume_out_of_range_bits_on),
            MAP_TYPE_REFERENCE => map.init_reference(channel)?,
            other => {
                return Err(PageError::Corrupt(format!(
                    "unrecognized usage map type {other:#04x}"
                )))
            }
        }

        Ok(map)
    }

    fn init_inline(&mut self, assume_out_of_range_bits_on: bool) {
        self.handler = Handler::Inline {
            assume_out_of_range_bits_on,
        };
        self.start_offset = self.row_start + self.format.offset_usage_map_start;
        let start_page = read_u32_le(&self.table_buffer, self.row_start + 1);
        self.set_inline_page_range(start_page);

        let payload_end = self
            .row_end
            .min(self.start_offset + self.format.usage_map_table_byte_length);
        process_map(
            &mut self.pages,
            &self.table_buffer[self.start_offset..payload_end],
            0,
        );
    }

    fn init_reference(&mut self, channel: &mut dyn PageChannel) -> Result<()> {
        let pages_per_map_page = self.format.max_pages_per_usage_map_page();
        let pointer_count = self.format.usage_map_page_pointer_count();
        self.handler = Handler::Reference;
        self.map_page_cache = None;
        self.start_offset = self.format.offset_usage_map_page_data;
        self.start_page = 0;
        self.end_page = pointer_count as u32 * pages_per_map_page;

        for index in 0..pointer_count {
            let map_page_num =
                read_u32_le(&self.table_buffer, self.map_page_pointer_offset(index));
            if map_page_num == 0 {
                continue;
            }
            let mut buf = vec![0u8; channel.page_size()];
            channel.read_page(map_page_num, &mut buf)?;
            if buf[0] != page_type::USAGE_MAP {
                return Err(PageError::Corrupt(format!(
                    "expected usage map at page {map_page_num}, but page type is {:#04x}",
                    buf[0]
                )));
            }
            process_map(
                &mut self.pages,
                &buf[self.format.offset_usage_map_page_data..],
                pages_per_map_page as usize * index,
            );
            self.map_page_cache = Some((map_page_num, buf));
        }
        Ok(())
    }

    /// Whether this map currently uses the inline representation.
    pub fn is_inline(&self) -> bool {
        matches!(self.handler, Handler::Inline { .. })
    }

    /// First page of the tracked range.
    pub fn start_page(&self) -> u32 {
        self.start_page
    }

    /// One past the last page of the tracked range.
    pub fn end_page(&self) -> u32 {
        self.end_page
    }

    /// Number of pages currently in the map (within the tracked range).
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Whether `page` is in the map. Pages outside the tracked range are
    /// reported as present when the map assumes out-of-range bits on.
    pub fn contains(&self, page: u32) -> bool {
        if self.is_page_within_range(page) {
            self.pages.contains((page - self.start_page) as usize)
        } else {
            matches!(
                self.handler,
                Handler::Inline {
                    assume_out_of_range_bits_on: true
                }
            )
        }
    }

    fn is_page_within_range(&self, page: u32) -> bool {
        page >= self.start_page && page < self.end_page
    }

    fn assume_out_of_range_bits_on(&self) -> bool {
        matches!(
            self.handler,
            Handler::Inline {
                assume_out_of_range_bits_on: true
            }
        )
    }

    /// First page in the map, if any.
    pub fn first_page(&self) -> Option<u32> {
        self.pages.min().map(|i| self.start_page + i as u32)
    }

    /// Last page in the map, if any.
    pub fn last_page(&self) -> Option<u32> {
        self.pages.max().map(|i| self.start_page + i as u32)
    }

    /// Smallest member strictly greater than `page`.
    fn next_page_after(&self, page: u32) -> Option<u32> {
        let from = i64::from(page) + 1 - i64::from(self.start_page);
        let from = from.max(0) as usize;
        self.pages
            .next_set_bit(from)
            .map(|i| self.start_page + i as u32)
    }

    /// Largest member strictly less than `page`.
    fn prev_page_before(&self, page: u32) -> Option<u32> {
        let from = i64::from(page) - 1 - i64::from(self.start_page);
        if from < 0 {
            return None;
        }
        self.pages
            .prev_set_bit(from as usize)
            .map(|i| self.start_page + i as u32)
    }

    /// Iterate the current page set in ascending order.
    ///
    /// This borrows the map; use [`UsageMap::cursor`] when iteration has to
    /// survive interleaved mutation.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.iter().map(move |i| self.start_page + i as u32)
    }

    /// Cursor over the map in ascending page order.
    pub fn cursor(&self) -> PageCursor {
        PageCursor::new(self, Direction::Forward)
    }

    /// Cursor over the map in descending page order.
    pub fn reverse_cursor(&self) -> PageCursor {
        PageCursor::new(self, Direction::Reverse)
    }

    /// Add `page` to the map.
    pub fn add_page_number(&mut self, channel: &mut dyn PageChannel, page: u32) -> Result<()> {
        self.mod_count = self.mod_count.wrapping_add(1);
        self.add_or_remove_page_number(channel, page, true)
    }

    /// Remove `page` from the map.
    pub fn remove_page_number(&mut self, channel: &mut dyn PageChannel, page: u32) -> Result<()> {
        self.mod_count = self.mod_count.wrapping_add(1);
        self.add_or_remove_page_number(channel, page, false)
    }

    fn add_or_remove_page_number(
        &mut self,
        channel: &mut dyn PageChannel,
        page: u32,
        add: bool,
    ) -> Result<()> {
        match self.handler {
            Handler::Inline { .. } => self.inline_add_or_remove(channel, page, add),
            Handler::Reference => self.reference_add_or_remove(channel, page, add),
        }
    }

    fn inline_add_or_remove(
        &mut self,
        channel: &mut dyn PageChannel,
        page: u32,
        add: bool,
    ) -> Result<()> {
        if self.is_page_within_range(page) {
            let relative = page - self.start_page;
            update_map(
                &mut self.pages,
                &mut self.table_buffer,
                self.start_offset,
                relative,
                relative as usize,
                page,
                add,
            )?;
            return self.write_table(channel);
        }

        // The page falls outside the window the inline bitmap can describe;
        // what happens next depends on the direction of the mutation and on
        // the out-of-range convention.
        let assume_on = self.assume_out_of_range_bits_on();
        let first_page = self.first_page();
        let last_page = self.last_page();

        if add {
            if assume_on {
                // Already implicitly "on". Accept the small permanent hole
                // in the free-space pool.
                return Ok(());
            }

            let (first, last) = match (first_page, last_page) {
                (Some(f), Some(l)) => {
                    if page > l {
                        (f, page)
                    } else {
                        (page, l)
                    }
                }
                _ => (page, page),
            };
            if last - first + 1 < self.format.max_inline_usage_map_pages() {
                // Still fits in an inline window once shifted.
                self.move_to_new_start_page(channel, first, Some(page))
            } else {
                self.promote_to_reference(channel, page)
            }
        } else if assume_on {
            // Removing an implicitly-on page. If it lies beyond the tracked
            // window, shift the window forward, marking the intervening
            // pages on as we go. Pages before the window were abandoned for
            // good; ignore those.
            if first_page.is_none() || last_page.is_some_and(|last| page > last) {
                self.move_to_new_start_page_for_remove(channel, first_page, last_page, page)?;
            }
            Ok(())
        } else {
            Err(PageError::Corrupt(format!(
                "page {page} already removed from usage map"
            )))
        }
    }

    fn reference_add_or_remove(
        &mut self,
        channel: &mut dyn PageChannel,
        page: u32,
        add: bool,
    ) -> Result<()> {
        if !self.is_page_within_range(page) {
            return Err(PageError::OutOfRange { page });
        }

        let pages_per_map_page = self.format.max_pages_per_usage_map_page();
        let page_index = (page / pages_per_map_page) as usize;
        let pointer_offset = self.map_page_pointer_offset(page_index);

        let mut map_page_num = read_u32_le(&self.table_buffer, pointer_offset);
        let mut map_page_buffer;
        if map_page_num == 0 {
            // First touch of this region: materialize its bitmap page and
            // point the declaration row at it.
            map_page_num = channel.allocate_new_page()?;
            map_page_buffer = vec![0u8; channel.page_size()];
            map_page_buffer[0] = page_type::USAGE_MAP;
            map_page_buffer[1] = 0x01;
            write_u32_le(&mut self.table_buffer, pointer_offset, map_page_num);
            self.write_table(channel)?;
        } else {
            map_page_buffer = match self.map_page_cache.take() {
                Some((cached_num, buf)) if cached_num == map_page_num => buf,
                _ => {
                    let mut buf = vec![0u8; channel.page_size()];
                    channel.read_page(map_page_num, &mut buf)?;
                    buf
                }
            };
        }

        update_map(
            &mut self.pages,
            &mut map_page_buffer,
            self.start_offset,
            page - pages_per_map_page * page_index as u32,
            page as usize,
            page,
            add,
        )?;
        channel.write_page(map_page_num, &map_page_buffer)?;
        self.map_page_cache = Some((map_page_num, map_page_buffer));
        Ok(())
    }

    fn set_inline_page_range(&mut self, start_page: u32) {
        self.start_page = start_page;
        self.end_page = start_page.saturating_add(self.format.max_inline_usage_map_pages());
    }

    fn map_page_pointer_offset(&self, index: usize) -> usize {
        self.row_start + self.format.offset_reference_map_page_numbers + index * 4
    }

    fn write_table(&mut self, channel: &mut dyn PageChannel) -> Result<()> {
        channel.write_page(self.table_page_num, &self.table_buffer)
    }

    /// Reset the in-memory state and zero the start-page field plus bitmap
    /// payload of the declaration row.
    fn clear_table_and_pages(&mut self) {
        self.pages.clear();
        self.start_page = 0;
        self.end_page = 0;
        self.mod_count = self.mod_count.wrapping_add(1);

        let table_start = self.row_start + self.format.offset_usage_map_start - 4;
        let table_end = table_start + self.format.usage_map_table_byte_length + 4;
        self.table_buffer[table_start..table_end].fill(0);
    }

    /// Shift the inline map so it starts at `new_start_page`, then re-add
    /// the previous members (and `new_page_number`, when given).
    fn move_to_new_start_page(
        &mut self,
        channel: &mut dyn PageChannel,
        new_start_page: u32,
        new_page_number: Option<u32>,
    ) -> Result<()> {
        let old_start_page = self.start_page;
        let old_pages = self.pages.clone();

        self.clear_table_and_pages();

        write_u32_le(&mut self.table_buffer, self.row_start + 1, new_start_page);
        self.write_table(channel)?;
        self.set_inline_page_range(new_start_page);

        self.re_add_pages(channel, old_start_page, &old_pages, new_page_number)
    }

    /// Shift protocol for removing an implicitly-on page beyond the window.
    ///
    /// Moves the window far enough forward to describe `page`, turns every
    /// page between the old last member and the new end of range on (all of
    /// them were implicitly on), then removes `page` itself.
    fn move_to_new_start_page_for_remove(
        &mut self,
        channel: &mut dyn PageChannel,
        first_page: Option<u32>,
        last_page: Option<u32>,
        page: u32,
    ) -> Result<()> {
        let max_inline_pages = self.format.max_inline_usage_map_pages();
        let new_start_page = match first_page {
            None => page,
            Some(first) if page - first + 1 >= max_inline_pages => {
                // Shifting to `first` will not move far enough to cover the
                // new page; discard the initial unused stretch instead.
                first + (page - max_inline_pages + 1)
            }
            Some(first) => first,
        };

        self.move_to_new_start_page(channel, new_start_page, None)?;

        match (first_page, last_page) {
            (None, _) => {
                // Everything was left behind: the whole new window is
                // implicitly on. Saturate the bitmap wholesale.
                let table_start = self.row_start + self.format.offset_usage_map_start;
                let table_end = table_start + self.format.usage_map_table_byte_length;
                self.table_buffer[table_start..table_end].fill(0xFF);
                self.write_table(channel)?;
                self.pages.insert_all_below(max_inline_pages as usize);
            }
            (Some(_), Some(last)) => {
                for p in (last + 1)..self.end_page {
                    self.add_page_number(channel, p)?;
                }
            }
            (Some(_), None) => {}
        }

        self.remove_page_number(channel, page)
    }

    /// Rewrite the declaration row as a reference map and carry the page
    /// set over, then add `new_page_number`.
    fn promote_to_reference(
        &mut self,
        channel: &mut dyn PageChannel,
        new_page_number: u32,
    ) -> Result<()> {
        let old_start_page = self.start_page;
        let old_pages = self.pages.clone();

        self.clear_table_and_pages();
        self.table_buffer[self.row_start] = MAP_TYPE_REFERENCE;
        self.write_table(channel)?;

        // All pointers are zero after the clear, so this installs an empty
        // reference handler; the old members are added back through the
        // normal protocol, allocating bitmap pages as needed.
        self.init_reference(channel)?;

        self.re_add_pages(channel, old_start_page, &old_pages, Some(new_page_number))
    }

    fn re_add_pages(
        &mut self,
        channel: &mut dyn PageChannel,
        old_start_page: u32,
        old_pages: &PageSet,
        new_page_number: Option<u32>,
    ) -> Result<()> {
        for index in old_pages.iter() {
            self.add_page_number(channel, old_start_page + index as u32)?;
        }
        if let Some(page) = new_page_number {
            self.add_page_number(channel, page)?;
        }
        Ok(())
    }
}

impl fmt::Display for UsageMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page numbers: [")?;
        for (i, page) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{page}")?;
        }
        write!(f, "]")
    }
}

/// Populate `pages` from a bitmap slice whose first bit is page index
/// `base_index`.
fn process_map(pages: &mut PageSet, buffer: &[u8], base_index: usize) {
    for (byte_index, &b) in buffer.iter().enumerate() {
        if b == 0 {
            continue;
        }
        for bit in 0..8 {
            if b & (1 << bit) != 0 {
                pages.insert(base_index + byte_index * 8 + bit);
            }
        }
    }
}

/// Flip one bit in both the in-memory set and the backing buffer.
///
/// `relative_page` addresses the bit within the buffer's bitmap payload;
/// `bit_index` addresses it within `pages`. A redundant add or remove means
/// the map no longer matches the disk and is reported as corruption.
fn update_map(
    pages: &mut PageSet,
    buffer: &mut [u8],
    start_offset: usize,
    relative_page: u32,
    bit_index: usize,
    absolute_page: u32,
    add: bool,
) -> Result<()> {
    let offset = (relative_page / 8) as usize;
    let mask = 1u8 << (relative_page % 8);

    let is_on = pages.contains(bit_index);
    if is_on == add {
        return Err(PageError::Corrupt(format!(
            "page {absolute_page} already {} usage map",
            if add { "added to" } else { "removed from" }
        )));
    }

    let byte = &mut buffer[start_offset + offset];
    if add {
        *byte |= mask;
        pages.insert(bit_index);
    } else {
        *byte &= !mask;
        pages.remove(bit_index);
    }
    Ok(())
}

fn read_u32_le(buffer: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ])
}

fn write_u32_le(buffer: &mut [u8], offset: usize, value: u32) {
    buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

/// Cursor over a usage map that stays usable across mutation.
///
/// The cursor holds page numbers rather than positions in the bit set, so
/// shifts and promotions do not invalidate it: when the map's modification
/// count changes while the cursor believed it was exhausted, the next
/// position is recomputed from the last returned page. Pages already
/// returned are never returned again; pages that remain in (or enter) the
/// map beyond the last returned position will be visited.
///
/// Methods take the map by reference, which is what lets the owning code
/// mutate the map between `has_next` and `next`.
#[derive(Debug, Clone)]
pub struct PageCursor {
    direction: Direction,
    prev_page: Option<u32>,
    next_page: Option<u32>,
    last_mod_count: u32,
}

impl PageCursor {
    fn new(map: &UsageMap, direction: Direction) -> PageCursor {
        let mut cursor = PageCursor {
            direction,
            prev_page: None,
            next_page: None,
            last_mod_count: 0,
        };
        cursor.reset(map);
        cursor
    }

    fn initial_page(&self, map: &UsageMap) -> Option<u32> {
        match self.direction {
            Direction::Forward => map.first_page(),
            Direction::Reverse => map.last_page(),
        }
    }

    fn advance(&self, map: &UsageMap, from: u32) -> Option<u32> {
        match self.direction {
            Direction::Forward => map.next_page_after(from),
            Direction::Reverse => map.prev_page_before(from),
        }
    }

    /// Whether another page is available.
    pub fn has_next(&mut self, map: &UsageMap) -> bool {
        if self.next_page.is_none() && self.last_mod_count != map.mod_count {
            // The map changed while we looked exhausted; recheck after the
            // last returned page, or from scratch if nothing was returned.
            match self.prev_page {
                None => self.reset(map),
                Some(prev) => {
                    self.last_mod_count = map.mod_count;
                    self.next_page = self.advance(map, prev);
                }
            }
        }
        self.next_page.is_some()
    }

    /// Return the next page, or `None` when exhausted.
    pub fn next(&mut self, map: &UsageMap) -> Option<u32> {
        if !self.has_next(map) {
            return None;
        }
        self.last_mod_count = map.mod_count;
        let current = self.next_page.take()?;
        self.prev_page = Some(current);
        self.next_page = self.advance(map, current);
        Some(current)
    }

    /// Restart iteration from the map's current first (or last) page.
    pub fn reset(&mut self, map: &UsageMap) {
        self.last_mod_count = map.mod_count;
        self.prev_page = None;
        self.next_page = self.initial_page(map);
    }
}

use jet_format::{page_type, JetFormat};
use jet_pages::{PageChannel, PageError, Result, UsageMap, MAP_TYPE_REFERENCE};
use pretty_assertions::assert_eq;

const FORMAT: JetFormat = JetFormat::VERSION_4;
const ROW_START: usize = 100;
const ROW_END: usize = ROW_START + 5 + 64;
const DECL_PAGE: u32 = 1;

/// In-memory page file: dense pages, allocation appends a zeroed page.
struct MemChannel {
    pages: Vec<Vec<u8>>,
}

impl MemChannel {
    fn new(page_count: usize) -> MemChannel {
        MemChannel {
            pages: vec![vec![0u8; FORMAT.page_size]; page_count],
        }
    }
}

impl PageChannel for MemChannel {
    fn page_size(&self) -> usize {
        FORMAT.page_size
    }

    fn read_page(&mut self, page_number: u32, buf: &mut [u8]) -> Result<()> {
        let page = self
            .pages
            .get(page_number as usize)
            .ok_or_else(|| PageError::Corrupt(format!("no such page {page_number}")))?;
        buf.copy_from_slice(page);
        Ok(())
    }

    fn write_page(&mut self, page_number: u32, buf: &[u8]) -> Result<()> {
        let page = self
            .pages
            .get_mut(page_number as usize)
            .ok_or_else(|| PageError::Corrupt(format!("no such page {page_number}")))?;
        page.copy_from_slice(buf);
        Ok(())
    }

    fn allocate_new_page(&mut self) -> Result<u32> {
        self.pages.push(vec![0u8; FORMAT.page_size]);
        Ok((self.pages.len() - 1) as u32)
    }
}

/// Write an inline usage-map declaration row with the given members.
fn write_inline_decl(channel: &mut MemChannel, start_page: u32, members: &[u32]) {
    let page = &mut channel.pages[DECL_PAGE as usize];
    page[ROW_START] = 0x00;
    page[ROW_START + 1..ROW_START + 5].copy_from_slice(&start_page.to_le_bytes());
    for &member in members {
        let bit = (member - start_page) as usize;
        page[ROW_START + 5 + bit / 8] |= 1 << (bit % 8);
    }
}

/// Write an empty reference usage-map declaration row.
fn write_reference_decl(channel: &mut MemChannel) {
    let page = &mut channel.pages[DECL_PAGE as usize];
    page[ROW_START] = MAP_TYPE_REFERENCE;
}

fn read_map(channel: &mut MemChannel, assume_out_of_range_bits_on: bool) -> UsageMap {
    UsageMap::read(
        channel,
        DECL_PAGE,
        ROW_START,
        ROW_END,
        FORMAT,
        assume_out_of_range_bits_on,
    )
    .expect("usage map should load")
}

fn pages_of(map: &UsageMap) -> Vec<u32> {
    map.iter().collect()
}

/// The in-memory view must reproduce exactly when the declaration (and any
/// referenced usage-map pages) are re-read from disk.
fn assert_disk_matches(channel: &mut MemChannel, map: &UsageMap, assume: bool) {
    let reread = read_map(channel, assume);
    assert_eq!(pages_of(&reread), pages_of(map));
    assert_eq!(reread.start_page(), map.start_page());
    assert_eq!(reread.end_page(), map.end_page());
    assert_eq!(reread.is_inline(), map.is_inline());
}

#[test]
fn inline_read_add_remove_round_trip() {
    let mut channel = MemChannel::new(4);
    write_inline_decl(&mut channel, 10, &[10, 12, 300]);

    let mut map = read_map(&mut channel, false);
    assert!(map.is_inline());
    assert_eq!(map.start_page(), 10);
    assert_eq!(map.end_page(), 10 + 512);
    assert_eq!(pages_of(&map), vec![10, 12, 300]);
    assert!(map.contains(12));
    assert!(!map.contains(11));
    assert!(!map.contains(9000));

    map.add_page_number(&mut channel, 11).unwrap();
    map.remove_page_number(&mut channel, 12).unwrap();
    assert_eq!(pages_of(&map), vec![10, 11, 300]);
    assert_disk_matches(&mut channel, &map, false);
}

#[test]
fn redundant_add_and_remove_are_corruption() {
    let mut channel = MemChannel::new(4);
    write_inline_decl(&mut channel, 0, &[3]);

    let mut map = read_map(&mut channel, false);
    assert!(matches!(
        map.add_page_number(&mut channel, 3),
        Err(PageError::Corrupt(_))
    ));
    assert!(matches!(
        map.remove_page_number(&mut channel, 4),
        Err(PageError::Corrupt(_))
    ));
}

#[test]
fn inline_add_below_start_shifts_window() {
    let mut channel = MemChannel::new(4);
    write_inline_decl(&mut channel, 100, &[100, 101]);

    let mut map = read_map(&mut channel, false);
    map.add_page_number(&mut channel, 90).unwrap();

    assert!(map.is_inline());
    assert_eq!(map.start_page(), 90);
    assert_eq!(map.end_page(), 90 + 512);
    assert_eq!(pages_of(&map), vec![90, 100, 101]);
    assert_disk_matches(&mut channel, &map, false);
}

#[test]
fn inline_add_beyond_end_shifts_to_first_member() {
    let mut channel = MemChannel::new(4);
    write_inline_decl(&mut channel, 100, &[500]);

    let mut map = read_map(&mut channel, false);
    // 620 is outside [100, 612) but within 512 pages of the first member.
    map.add_page_number(&mut channel, 620).unwrap();

    assert!(map.is_inline());
    assert_eq!(map.start_page(), 500);
    assert_eq!(pages_of(&map), vec![500, 620]);
    assert_disk_matches(&mut channel, &map, false);
}

#[test]
fn inline_promotes_to_reference_when_range_is_too_wide() {
    let mut channel = MemChannel::new(4);
    write_inline_decl(&mut channel, 0, &[0, 1, 2, 3, 4]);

    let mut map = read_map(&mut channel, false);
    map.add_page_number(&mut channel, 513).unwrap();

    assert!(!map.is_inline());
    assert_eq!(map.start_page(), 0);
    assert_eq!(
        map.end_page(),
        17 * FORMAT.max_pages_per_usage_map_page()
    );
    assert_eq!(pages_of(&map), vec![0, 1, 2, 3, 4, 513]);

    // The declaration row was rewritten in place as a reference map.
    assert_eq!(channel.pages[DECL_PAGE as usize][ROW_START], MAP_TYPE_REFERENCE);
    assert_disk_matches(&mut channel, &map, false);
}

#[test]
fn sequential_adds_cross_the_inline_boundary_and_promote() {
    let mut channel = MemChannel::new(4);
    write_inline_decl(&mut channel, 0, &[]);

    let mut map = read_map(&mut channel, false);
    for page in 0..600 {
        map.add_page_number(&mut channel, page).unwrap();
    }
    assert!(!map.is_inline());
    assert_eq!(pages_of(&map), (0..600).collect::<Vec<_>>());
    assert_disk_matches(&mut channel, &map, false);
}

#[test]
fn reference_map_grows_first_middle_and_last_regions() {
    let mut channel = MemChannel::new(4);
    write_reference_decl(&mut channel);

    let per_page = FORMAT.max_pages_per_usage_map_page();
    let mut map = read_map(&mut channel, false);
    assert!(!map.is_inline());
    assert_eq!(pages_of(&map), Vec::<u32>::new());

    let in_first = 3;
    let in_second = per_page + 5;
    let in_last = 16 * per_page + 7;
    map.add_page_number(&mut channel, in_first).unwrap();
    map.add_page_number(&mut channel, in_second).unwrap();
    map.add_page_number(&mut channel, in_last).unwrap();

    assert_eq!(pages_of(&map), vec![in_first, in_second, in_last]);

    // Three usage-map pages were allocated and pointed to from the row.
    let decl = &channel.pages[DECL_PAGE as usize];
    let pointer = |index: usize| {
        u32::from_le_bytes(
            decl[ROW_START + 1 + index * 4..ROW_START + 5 + index * 4]
                .try_into()
                .unwrap(),
        )
    };
    for index in [0usize, 1, 16] {
        let map_page = pointer(index);
        assert_ne!(map_page, 0, "region {index} should have a bitmap page");
        assert_eq!(channel.pages[map_page as usize][0], page_type::USAGE_MAP);
    }
    assert_eq!(pointer(2), 0);

    map.remove_page_number(&mut channel, in_second).unwrap();
    assert_eq!(pages_of(&map), vec![in_first, in_last]);
    assert_disk_matches(&mut channel, &map, false);
}

#[test]
fn reference_map_rejects_pages_beyond_capacity() {
    let mut channel = MemChannel::new(4);
    write_reference_decl(&mut channel);

    let mut map = read_map(&mut channel, false);
    let capacity = map.end_page();
    assert!(matches!(
        map.add_page_number(&mut channel, capacity),
        Err(PageError::OutOfRange { .. })
    ));
}

#[test]
fn assume_on_add_out_of_range_is_a_noop() {
    let mut channel = MemChannel::new(4);
    write_inline_decl(&mut channel, 10, &[10, 11]);
    let before = channel.pages[DECL_PAGE as usize].clone();

    let mut map = read_map(&mut channel, true);
    map.add_page_number(&mut channel, 9999).unwrap();

    assert_eq!(pages_of(&map), vec![10, 11]);
    assert!(map.contains(9999));
    assert_eq!(channel.pages[DECL_PAGE as usize], before);
}

#[test]
fn assume_on_remove_before_window_is_ignored() {
    let mut channel = MemChannel::new(4);
    write_inline_decl(&mut channel, 10, &[10, 11]);

    let mut map = read_map(&mut channel, true);
    map.remove_page_number(&mut channel, 5).unwrap();
    assert_eq!(pages_of(&map), vec![10, 11]);
    assert_eq!(map.start_page(), 10);
}

#[test]
fn assume_on_remove_beyond_window_shifts_and_fills() {
    let mut channel = MemChannel::new(4);
    write_inline_decl(&mut channel, 10, &[10, 11]);

    let mut map = read_map(&mut channel, true);
    // 600 is implicitly on but past the window; the window moves forward
    // far enough to describe it, turning the implicit range explicit.
    map.remove_page_number(&mut channel, 600).unwrap();

    assert_eq!(map.start_page(), 10 + (600 - 512 + 1));
    assert!(!map.contains(600));
    assert!(map.contains(599));
    assert!(map.contains(601));
    let expected: Vec<u32> = (map.start_page()..map.end_page())
        .filter(|p| *p != 600)
        .collect();
    assert_eq!(pages_of(&map), expected);
    assert_disk_matches(&mut channel, &map, true);
}

#[test]
fn assume_on_remove_from_empty_map_saturates_new_window() {
    let mut channel = MemChannel::new(4);
    write_inline_decl(&mut channel, 0, &[]);

    let mut map = read_map(&mut channel, true);
    map.remove_page_number(&mut channel, 50).unwrap();

    assert_eq!(map.start_page(), 50);
    assert!(!map.contains(50));
    assert!(map.contains(51));
    assert_eq!(map.page_count(), 511);
    assert_disk_matches(&mut channel, &map, true);
}

#[test]
fn forward_and_reverse_cursors_enumerate_the_same_set() {
    let mut channel = MemChannel::new(4);
    write_inline_decl(&mut channel, 0, &[5, 10, 15, 200]);

    let map = read_map(&mut channel, false);

    let mut forward = Vec::new();
    let mut cursor = map.cursor();
    while let Some(page) = cursor.next(&map) {
        forward.push(page);
    }
    assert_eq!(forward, vec![5, 10, 15, 200]);

    let mut reverse = Vec::new();
    let mut cursor = map.reverse_cursor();
    while cursor.has_next(&map) {
        reverse.push(cursor.next(&map).unwrap());
    }
    assert_eq!(reverse, vec![200, 15, 10, 5]);
}

#[test]
fn cursor_observes_pages_added_beyond_its_position() {
    let mut channel = MemChannel::new(4);
    write_inline_decl(&mut channel, 0, &[5, 10, 15]);

    let mut map = read_map(&mut channel, false);
    let mut cursor = map.cursor();
    assert_eq!(cursor.next(&map), Some(5));
    assert_eq!(cursor.next(&map), Some(10));

    // Added after the cursor's position: visited.
    map.add_page_number(&mut channel, 12).unwrap();
    // Added before it: already passed, not revisited.
    map.add_page_number(&mut channel, 7).unwrap();

    assert_eq!(cursor.next(&map), Some(12));
    assert_eq!(cursor.next(&map), Some(15));
    assert_eq!(cursor.next(&map), None);
}

#[test]
fn exhausted_cursor_resumes_after_mutation() {
    let mut channel = MemChannel::new(4);
    write_inline_decl(&mut channel, 0, &[5]);

    let mut map = read_map(&mut channel, false);
    let mut cursor = map.cursor();
    assert_eq!(cursor.next(&map), Some(5));
    assert!(!cursor.has_next(&map));

    map.add_page_number(&mut channel, 20).unwrap();
    assert!(cursor.has_next(&map));
    assert_eq!(cursor.next(&map), Some(20));

    // A cursor that never returned anything rechecks from the start.
    let mut channel2 = MemChannel::new(4);
    write_inline_decl(&mut channel2, 0, &[]);
    let mut empty = read_map(&mut channel2, false);
    let mut fresh = empty.cursor();
    assert!(!fresh.has_next(&empty));
    empty.add_page_number(&mut channel2, 3).unwrap();
    assert_eq!(fresh.next(&empty), Some(3));
}

#[test]
fn cursor_survives_promotion() {
    let mut channel = MemChannel::new(4);
    write_inline_decl(&mut channel, 0, &[1, 2]);

    let mut map = read_map(&mut channel, false);
    let mut cursor = map.cursor();
    assert_eq!(cursor.next(&map), Some(1));

    map.add_page_number(&mut channel, 513).unwrap();
    assert!(!map.is_inline());

    assert_eq!(cursor.next(&map), Some(2));
    assert_eq!(cursor.next(&map), Some(513));
    assert_eq!(cursor.next(&map), None);
}

#[test]
fn unknown_map_type_is_corruption() {
    let mut channel = MemChannel::new(4);
    channel.pages[DECL_PAGE as usize][ROW_START] = 0x7F;
    let result = UsageMap::read(&mut channel, DECL_PAGE, ROW_START, ROW_END, FORMAT, false);
    assert!(matches!(result, Err(PageError::Corrupt(_))));
}

#[test]
fn display_lists_pages() {
    let mut channel = MemChannel::new(4);
    write_inline_decl(&mut channel, 0, &[1, 4]);
    let map = read_map(&mut channel, false);
    assert_eq!(map.to_string(), "page numbers: [1, 4]");
}

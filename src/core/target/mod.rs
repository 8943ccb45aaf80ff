mod finder;

pub use finder::{
    candidate_library_roots, find_game_dir, find_game_dir_in, is_valid_game_path,
    parse_library_folders,
};

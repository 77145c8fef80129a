extern crate eventasm;

mod common;

#[cfg(test)]
mod session {
    use std::{fs, path::PathBuf};

    use eventasm::{assemble_file, Config, Options, Registry, RomFile};

    use crate::common::{image, RAWS};

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("eventasm-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn scripts_on_disk() {
        let dir = scratch("files");
        fs::create_dir_all(dir.join("raws")).unwrap();
        fs::create_dir_all(dir.join("shared")).unwrap();
        fs::write(dir.join("raws/events.txt"), RAWS).unwrap();
        fs::write(dir.join("raws/notes.md"), "not a definition file").unwrap();
        fs::write(dir.join("shared/defs.event"), "#define START 0x100\n").unwrap();
        fs::write(
            dir.join("main.event"),
            "#include \"defs.event\"\nORG START\nSET(LEVEL)\nEND\n",
        )
        .unwrap();
        fs::write(dir.join("game.gba"), image().as_bytes()).unwrap();

        let registry = Registry::load_dir(dir.join("raws"), ".txt").unwrap();
        assert!(registry.contains_name("SET"));
        assert!(!registry.is_empty());

        let options = Options {
            include_dirs: vec![dir.join("shared")],
            defines: vec![("LEVEL".to_string(), 7)],
            ..Options::default()
        };
        let mut rom = RomFile::open(dir.join("game.gba")).unwrap();
        let outcome = assemble_file(
            dir.join("main.event"),
            &registry,
            &mut rom,
            &Config::default(),
            &options,
        );
        assert!(outcome.success, "{outcome}");
        rom.save_as(dir.join("out.gba")).unwrap();
        drop(rom);

        let out = fs::read(dir.join("out.gba")).unwrap();
        assert_eq!(out[0x100..0x108], [0x05, 0, 7, 0, 0x04, 0, 0, 0]);
        assert_eq!(fs::read(dir.join("game.gba")).unwrap(), image().as_bytes());

        // without the include directory the script cannot be read
        let mut rom = RomFile::open(dir.join("game.gba")).unwrap();
        let outcome = assemble_file(
            dir.join("main.event"),
            &registry,
            &mut rom,
            &Config::default(),
            &Options::default(),
        );
        assert!(!outcome.success);
        assert!(outcome.to_string().contains("file not found: \"defs.event\""), "{outcome}");
        assert_eq!(rom.as_bytes(), image().as_bytes());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn images_are_claimed_while_open() {
        let dir = scratch("claims");
        let path = dir.join("game.gba");
        fs::write(&path, image().as_bytes()).unwrap();

        let mut first = RomFile::open(&path).unwrap();
        let second = RomFile::open(dir.join(".").join("game.gba"));
        assert!(second.is_err());

        first.write(0x100, &[1, 2, 3, 4]).unwrap();
        first.save().unwrap();
        drop(first);

        let again = RomFile::open(&path).unwrap();
        assert_eq!(again.read(0x100, 4), Some(&[1, 2, 3, 4][..]));
        assert_eq!(again.path(), fs::canonicalize(&path).unwrap());
        drop(again);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unknown_game_leaves_the_file_alone() {
        let dir = scratch("unknown");
        let mut data = image().into_inner();
        data[0xAC..0xB0].copy_from_slice(b"QQQQ");
        fs::write(dir.join("game.gba"), &data).unwrap();
        fs::write(dir.join("main.event"), "ORG 0x100\nSET(1)\n").unwrap();

        let registry = Registry::load_str("raws.txt", RAWS).unwrap();
        let mut rom = RomFile::open(dir.join("game.gba")).unwrap();
        let outcome = assemble_file(
            dir.join("main.event"),
            &registry,
            &mut rom,
            &Config::default(),
            &Options::default(),
        );
        assert!(!outcome.success);
        assert_eq!(rom.as_bytes(), &data[..]);
        drop(rom);
        assert_eq!(fs::read(dir.join("game.gba")).unwrap(), data);
        fs::remove_dir_all(&dir).unwrap();
    }
}

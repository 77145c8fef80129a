extern crate eventasm;
extern crate insta;
extern crate parameterized;

mod common;

#[cfg(test)]
mod disassemble {
    use eventasm::{
        assemble_str, disassemble, Config, DisassembleRequest, DisassemblyMode, EngineKind,
        Options, Outcome, Registry, Rom,
    };
    use parameterized::parameterized;

    use crate::common::{assembled, config, registry, RAWS};

    const EVENTS: &str = r#"
ORG 0x100
SET(-5)
TEXT(0x20)
CALL(sub)
LOAD([1, 2, 3, 4, 0, 0, 0, 0])
NAME("Eirika")
MOVE([7, 9])
END
sub:
SET(1)
GOTO(sub)
"#;

    fn structure(rom: &Rom, offset: u32) -> (String, Outcome) {
        let request = DisassembleRequest::new(offset, DisassemblyMode::Structure);
        disassemble(rom, &registry(), &Config::default(), &request)
    }

    #[parameterized(engine = { EngineKind::Classic, EngineKind::Colorz })]
    fn round_trip(engine: EngineKind) {
        let rom = assembled(engine, EVENTS);
        let (text, outcome) = structure(&rom, 0x100);
        assert!(outcome.success, "{outcome}");
        assert!(outcome.log.is_empty(), "{outcome}");

        let mut again = rom.clone();
        let outcome = assemble_str(
            "disassembled.event",
            &text,
            &registry(),
            &mut again,
            &config(engine),
            &Options::default(),
        );
        assert!(outcome.success, "{outcome}\n{text}");
        assert_eq!(again.as_bytes(), rom.as_bytes());
    }

    #[test]
    fn structure_text() {
        let rom = assembled(EngineKind::Classic, EVENTS);
        let (text, _) = structure(&rom, 0x0800_0100);
        insta::assert_snapshot!(text.trim_end(), @r###"
ORG 0x100
label_000100:
SET(-5)
TEXT(0x20)
CALL(label_00012C)
LOAD(label_000200)
NAME("Eirika")
MOVE([7, 9])
END

ORG 0x12C
label_00012C:
SET(1)
GOTO(label_00012C)

ORG 0x200
label_000200:
UNIT(1, 2, [3, 4])
UNITEND
"###);
    }

    #[test]
    fn to_end_prints_addresses() {
        let rom = assembled(EngineKind::Classic, EVENTS);
        let request = DisassembleRequest::new(0x100, DisassemblyMode::ToEnd);
        let (text, outcome) = disassemble(&rom, &registry(), &Config::default(), &request);
        assert!(outcome.success, "{outcome}");
        insta::assert_snapshot!(text.trim_end(), @r###"
ORG 0x100
label_000100:
SET(-5)
TEXT(0x20)
CALL(0x12C)
LOAD(0x200)
NAME("Eirika")
MOVE([7, 9])
END
"###);
    }

    #[test]
    fn cycles_are_decoded_once() {
        let rom = assembled(
            EngineKind::Classic,
            "ORG 0x100\na:\nCALL(b)\nEND\nb:\nCALL(a)\nEND\n",
        );
        let (text, outcome) = structure(&rom, 0x100);
        assert!(outcome.success, "{outcome}");
        assert_eq!(text.matches("ORG ").count(), 2);
        assert_eq!(text.matches("label_000100:").count(), 1);
        assert_eq!(text.matches("label_00010C:").count(), 1);
        assert!(text.contains("CALL(label_000100)"), "{text}");
    }

    #[test]
    fn shared_and_interior_targets() {
        let rom = assembled(
            EngineKind::Classic,
            "ORG 0x100\nCALL(s)\nCALL(s)\nEND\ns:\nEND\n",
        );
        let (text, _) = structure(&rom, 0x100);
        assert_eq!(text.matches("ORG ").count(), 2);
        assert_eq!(text.matches("label_000114:").count(), 1);

        let rom = assembled(EngineKind::Classic, "ORG 0x100\nSET(1)\nhere:\nGOTO(here)\n");
        let (text, _) = structure(&rom, 0x100);
        assert_eq!(
            text,
            "ORG 0x100\nlabel_000100:\nSET(1)\nlabel_000104:\nGOTO(label_000104)\n"
        );
    }

    fn reassembled(text: &str, rom: &Rom) -> Rom {
        let mut again = rom.clone();
        let outcome = assemble_str(
            "disassembled.event",
            text,
            &registry(),
            &mut again,
            &Config::default(),
            &Options::default(),
        );
        assert!(outcome.success, "{outcome}\n{text}");
        again
    }

    #[test]
    fn pointer_to_offset_zero_is_kept_raw() {
        let rom = assembled(EngineKind::Classic, "ORG 0x100\nCALL(0x08000000)\nEND\n");
        assert_eq!(rom.read(0x104, 4), Some(&[0, 0, 0, 0x08][..]));
        let (text, outcome) = structure(&rom, 0x100);
        assert!(outcome.success, "{outcome}");
        assert_eq!(text, "ORG 0x100\nlabel_000100:\nCALL(0x8000000)\nEND\n");
        assert_eq!(reassembled(&text, &rom).as_bytes(), rom.as_bytes());
    }

    #[test]
    fn targets_inside_decoded_codes_are_kept_raw() {
        let rom = assembled(EngineKind::Classic, "ORG 0x100\nSET(1)\nCALL(0x102)\nEND\n");
        let (text, outcome) = structure(&rom, 0x100);
        assert!(outcome.success, "{outcome}");
        assert_eq!(text, "ORG 0x100\nlabel_000100:\nSET(1)\nCALL(0x102)\nEND\n");
        assert_eq!(reassembled(&text, &rom).as_bytes(), rom.as_bytes());

        let rom = assembled(EngineKind::Classic, "ORG 0x100\nCALL(0x106)\nEND\n");
        let (text, _) = structure(&rom, 0x100);
        assert_eq!(text, "ORG 0x100\nlabel_000100:\nCALL(0x106)\nEND\n");
        assert_eq!(reassembled(&text, &rom).as_bytes(), rom.as_bytes());
    }

    #[test]
    fn ties_break_by_priority_then_declaration() {
        let image = || {
            let mut rom = assembled(EngineKind::Classic, "ORG 0x104\nEND\n");
            rom.write(0x100, &[0x20, 0, 7, 0]).unwrap();
            rom
        };
        let request = DisassembleRequest::new(0x100, DisassemblyMode::ToEnd);

        let same = format!("{RAWS}ALPHA, 0x20, 4\n    value, 2, 2\nBETA, 0x20, 4\n    value, 2, 2\n");
        let registry = Registry::load_str("tie.txt", &same).unwrap();
        for _ in 0..3 {
            let (text, _) = disassemble(&image(), &registry, &Config::default(), &request);
            assert_eq!(text, "ORG 0x100\nlabel_000100:\nALPHA(7)\nEND\n");
        }

        let favored = format!(
            "{RAWS}ALPHA, 0x20, 4\n    value, 2, 2\nBETA, 0x20, 4, -priority:1\n    value, 2, 2\n"
        );
        let registry = Registry::load_str("tie.txt", &favored).unwrap();
        let (text, _) = disassemble(&image(), &registry, &Config::default(), &request);
        assert_eq!(text, "ORG 0x100\nlabel_000100:\nBETA(7)\nEND\n");
    }

    #[test]
    fn unknown_game_yields_nothing() {
        let mut rom = assembled(EngineKind::Classic, EVENTS);
        rom.write(0xAC, b"ZZZZ").unwrap();
        let (text, outcome) = structure(&rom, 0x100);
        assert!(text.is_empty());
        assert!(!outcome.success);
        assert_eq!(outcome.to_string(), "error: unsupported game: \"ZZZZ\"\n");
    }

    #[test]
    fn undecodable_bytes_are_reported() {
        let mut rom = assembled(EngineKind::Classic, "ORG 0x100\nSET(1)\n");
        rom.write(0x104, &[0x7F, 0, 0, 0]).unwrap();
        let mut request = DisassembleRequest::new(0x100, DisassemblyMode::ToEnd);
        request.group = Some("main".to_string());
        let (text, outcome) = disassemble(&rom, &registry(), &Config::default(), &request);
        assert!(!outcome.success);
        assert_eq!(text, "ORG 0x100\nlabel_000100:\nSET(1)\n");
        assert_eq!(outcome.to_string(), "$00000104: error: no matching code at $00000104\n");
    }
}

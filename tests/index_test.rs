use std::path::Path;

use asm_index::{
    config::ProjectConfig,
    index::{DefinitionKind, Index, IndexError},
    source::{LocalCopies, SourceFiles},
};

const SMB3: &str = "\
\t.org $0000
Temp_Var1:\t.ds 1\t; scratch
Objects_X:\t.ds 5

OBJ_COUNT = 5

\t.bank 0
\t.include \"PRG/prg000.asm\"
\t.bank 1
\t.include \"PRG/prg001.asm\"
";

const PRG000: &str = "\
PRG000_C000:
\tLDX #OBJ_COUNT
PRG000_Loop:
\tLDA Objects_X,X
\tSTA <Temp_Var1
\tDEX
\tBPL PRG000_Loop
\tRTS
";

const PRG001: &str = "\
Shared_Start:
\tJSR PRG000_C000\t; Temp_Var1 is not used here
\tLDA Objects_X
";

fn project() -> LocalCopies {
    [
        ("smb3.asm", SMB3),
        ("PRG/prg000.asm", PRG000),
        ("PRG/prg001.asm", PRG001),
    ]
    .into_iter()
    .collect()
}

fn lines_of(index: &Index, name: &str) -> Vec<(String, usize)> {
    index
        .references(name)
        .map(|reference| {
            (
                reference.position.file.display().to_string(),
                reference.position.line,
            )
        })
        .collect()
}

#[test]
fn test_definitions() {
    let index = Index::full_scan(
        &SourceFiles::in_memory(project()),
        &ProjectConfig::default(),
        &(),
    )
    .unwrap();
    let tests = vec![
        ("OBJ_COUNT", DefinitionKind::Constant, "5", "smb3.asm", 5),
        ("Temp_Var1", DefinitionKind::RamVariable, ".ds 1", "smb3.asm", 2),
        ("PRG000_Loop", DefinitionKind::Label, "", "PRG/prg000.asm", 3),
        ("Shared_Start", DefinitionKind::Label, "", "PRG/prg001.asm", 1),
    ];

    for (name, kind, value, file, line) in tests {
        let definition = index.definition(name).unwrap();
        assert_eq!(definition.kind, kind, "{}", name);
        assert_eq!(definition.value, value, "{}", name);
        assert_eq!(definition.position.file, Path::new(file), "{}", name);
        assert_eq!(definition.position.line, line, "{}", name);
    }
    assert_eq!(index.len(), 6);
}

#[test]
fn test_references() {
    let index = Index::full_scan(
        &SourceFiles::in_memory(project()),
        &ProjectConfig::default(),
        &(),
    )
    .unwrap();

    assert_eq!(
        lines_of(&index, "Objects_X"),
        vec![
            ("PRG/prg000.asm".to_owned(), 4),
            ("PRG/prg001.asm".to_owned(), 3)
        ]
    );
    assert_eq!(
        lines_of(&index, "Temp_Var1"),
        vec![("PRG/prg000.asm".to_owned(), 5)]
    );
    assert_eq!(
        lines_of(&index, "PRG000_Loop"),
        vec![("PRG/prg000.asm".to_owned(), 7)]
    );

    let reference = index.references("PRG000_C000").next().unwrap();
    assert_eq!(reference.line, "\tJSR PRG000_C000\t; Temp_Var1 is not used here");
}

#[test]
fn test_incremental_scan_uses_all_unsaved_files() {
    let config = ProjectConfig::default();
    let index = Index::full_scan(&SourceFiles::in_memory(project()), &config, &()).unwrap();

    // Both files are edited, only the one defining the new name is rescanned explicitly
    let mut edited = project();
    edited.insert(
        "PRG/prg001.asm",
        format!("{}SHARED_FLAG = $80\n", PRG001),
    );
    edited.insert(
        "PRG/prg000.asm",
        format!("{}\tLDA #SHARED_FLAG\n", PRG000),
    );
    let files = SourceFiles::in_memory(edited);

    let rescanned = index
        .rescan_file(&files, &config, Path::new("PRG/prg001.asm"), &())
        .unwrap();

    assert_eq!(rescanned.len(), index.len() + 1);
    assert_eq!(
        rescanned.definition("SHARED_FLAG").unwrap().kind,
        DefinitionKind::Constant
    );
    assert_eq!(
        lines_of(&rescanned, "SHARED_FLAG"),
        vec![("PRG/prg000.asm".to_owned(), 9)]
    );
    for name in ["OBJ_COUNT", "Objects_X", "PRG000_C000"] {
        assert_eq!(rescanned.definition(name), index.definition(name), "{}", name);
        assert_eq!(lines_of(&rescanned, name), lines_of(&index, name), "{}", name);
    }
}

#[test]
fn test_incremental_scan_matches_full_scan() {
    let config = ProjectConfig::default();
    let mut edited = project();
    edited.insert(
        "PRG/prg000.asm",
        PRG000.replace("PRG000_Loop:", "PRG000_Next:"),
    );
    let files = SourceFiles::in_memory(edited);

    let index = Index::full_scan(&SourceFiles::in_memory(project()), &config, &()).unwrap();
    let rescanned = index
        .rescan_file(&files, &config, Path::new("PRG/prg000.asm"), &())
        .unwrap();
    let full = Index::full_scan(&files, &config, &()).unwrap();

    assert!(rescanned.definition("PRG000_Loop").is_none());
    assert_eq!(
        rescanned.definition("PRG000_Next"),
        full.definition("PRG000_Next")
    );
    assert_eq!(lines_of(&rescanned, "PRG000_Loop"), lines_of(&full, "PRG000_Loop"));
    assert_eq!(lines_of(&rescanned, "Objects_X"), lines_of(&full, "Objects_X"));
}

#[test]
fn test_redefinition_in_one_scan() {
    let mut files = project();
    files.insert("PRG/prg001.asm", "OBJ_COUNT = 6\n");

    let err = Index::full_scan(
        &SourceFiles::in_memory(files),
        &ProjectConfig::default(),
        &(),
    )
    .unwrap_err();

    assert!(matches!(err, IndexError::Redefinition { ref name, .. } if name == "OBJ_COUNT"));
    assert_eq!(
        err.to_string(),
        "PRG/prg001.asm:1: 'OBJ_COUNT' is already defined at smb3.asm:5"
    );
}

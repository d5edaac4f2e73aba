/// Wavefront OBJ and MTL parsing for mask assets
use nalgebra::{Matrix4, Point3, Vector2};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, i64 as integer, space0, space1},
    combinator::{map, opt, rest},
    multi::many1,
    number::complete::float,
    sequence::{preceded, terminated},
    IResult,
};
use std::io::Write;
use std::path::Path;

use crate::geometry::{Face, Mesh, Topology};
use crate::{Error, Result, LANDMARK_COUNT};

/// One `f` corner: vertex index and optional texture index, 1-based or negative
#[derive(Debug, Clone, Copy, PartialEq)]
struct Corner {
    v: i64,
    vt: Option<i64>,
}

#[derive(Debug, PartialEq)]
enum Statement<'a> {
    Vertex(Point3<f32>),
    TexCoord(Vector2<f32>),
    Normal,
    Face(Vec<Corner>),
    MaterialLibrary(&'a str),
    UseMaterial(&'a str),
}

/// Raw content of an OBJ file before it becomes a [`Mesh`]
#[derive(Debug, Default)]
pub struct ObjData {
    pub positions: Vec<Point3<f32>>,
    pub triangles: Vec<Face>,
    pub uvs: Option<Vec<Vector2<f32>>>,
    pub material_library: Option<String>,
    pub material: Option<String>,
}

fn parse_vector3(input: &str) -> IResult<&str, (f32, f32, f32)> {
    let (input, x) = preceded(space1, float)(input)?;
    let (input, y) = preceded(space1, float)(input)?;
    let (input, z) = preceded(space1, float)(input)?;
    Ok((input, (x, y, z)))
}

fn parse_vertex(input: &str) -> IResult<&str, Statement> {
    let (input, (x, y, z)) = preceded(tag("v"), parse_vector3)(input)?;
    // Optional w component
    let (input, _) = opt(preceded(space1, float))(input)?;
    Ok((input, Statement::Vertex(Point3::new(x, y, z))))
}

fn parse_texcoord(input: &str) -> IResult<&str, Statement> {
    let (input, _) = tag("vt")(input)?;
    let (input, u) = preceded(space1, float)(input)?;
    let (input, v) = opt(preceded(space1, float))(input)?;
    let (input, _) = opt(preceded(space1, float))(input)?;
    Ok((input, Statement::TexCoord(Vector2::new(u, v.unwrap_or(0.0)))))
}

fn parse_normal(input: &str) -> IResult<&str, Statement> {
    map(preceded(tag("vn"), parse_vector3), |_| Statement::Normal)(input)
}

fn parse_corner(input: &str) -> IResult<&str, Corner> {
    let (input, v) = integer(input)?;
    let (input, vt) = opt(preceded(char('/'), opt(integer)))(input)?;
    let (input, _vn) = opt(preceded(char('/'), opt(integer)))(input)?;
    Ok((input, Corner { v, vt: vt.flatten() }))
}

fn parse_face(input: &str) -> IResult<&str, Statement> {
    let (input, _) = tag("f")(input)?;
    map(many1(preceded(space1, parse_corner)), Statement::Face)(input)
}

fn parse_name<'a>(keyword: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input| {
        let (input, name) = preceded(terminated(tag(keyword), space1), rest)(input)?;
        Ok((input, name.trim()))
    }
}

fn parse_statement(input: &str) -> IResult<&str, Statement> {
    let (input, _) = space0(input)?;
    let (input, statement) = alt((
        parse_texcoord,
        parse_normal,
        parse_vertex,
        parse_face,
        map(parse_name("mtllib"), Statement::MaterialLibrary),
        map(parse_name("usemtl"), Statement::UseMaterial),
    ))(input)?;
    let (input, _) = space0(input)?;
    Ok((input, statement))
}

fn resolve_index(index: i64, count: usize, line: usize) -> std::result::Result<usize, String> {
    let resolved = match index {
        i if i > 0 => i - 1,
        i if i < 0 => count as i64 + i,
        _ => return Err(format!("line {line}: index 0 is not valid in OBJ")),
    };
    if resolved < 0 || resolved as usize >= count {
        return Err(format!("line {line}: index {index} out of range (have {count})"));
    }
    Ok(resolved as usize)
}

/// Parse OBJ text. Polygons are fan-triangulated, normals are dropped.
pub fn parse_obj(input: &str) -> std::result::Result<ObjData, String> {
    let mut data = ObjData::default();
    let mut texcoords: Vec<Vector2<f32>> = Vec::new();
    let mut vertex_uv: Vec<Option<usize>> = Vec::new();
    let mut seams = 0usize;

    for (line_no, raw) in input.lines().enumerate() {
        let line_no = line_no + 1;
        let line = raw.split('#').next().unwrap_or("").trim_end();
        if line.trim().is_empty() {
            continue;
        }

        let statement = match parse_statement(line) {
            Ok(("", statement)) => statement,
            Ok((trailing, _)) => {
                return Err(format!("line {line_no}: unexpected trailing input {trailing:?}"));
            }
            // Unsupported statements (o, g, s, l, ...) are skipped
            Err(_) => continue,
        };

        match statement {
            Statement::Vertex(p) => {
                data.positions.push(p);
                vertex_uv.push(None);
            }
            Statement::TexCoord(uv) => texcoords.push(uv),
            Statement::Normal => {}
            Statement::Face(corners) => {
                if corners.len() < 3 {
                    return Err(format!("line {line_no}: face with {} corners", corners.len()));
                }
                let mut indices = Vec::with_capacity(corners.len());
                for corner in &corners {
                    let v = resolve_index(corner.v, data.positions.len(), line_no)?;
                    if let Some(vt) = corner.vt {
                        let t = resolve_index(vt, texcoords.len(), line_no)?;
                        match vertex_uv[v] {
                            Some(existing) if texcoords[existing] != texcoords[t] => seams += 1,
                            _ => vertex_uv[v] = Some(t),
                        }
                    }
                    indices.push(v as u32);
                }
                for i in 1..indices.len() - 1 {
                    data.triangles.push([indices[0], indices[i], indices[i + 1]]);
                }
            }
            Statement::MaterialLibrary(name) => data.material_library = Some(name.to_string()),
            Statement::UseMaterial(name) => {
                if data.material.is_none() {
                    data.material = Some(name.to_string());
                }
            }
        }
    }

    if vertex_uv.iter().any(Option::is_some) {
        data.uvs = Some(
            vertex_uv
                .iter()
                .map(|t| t.map(|t| texcoords[t]).unwrap_or_else(Vector2::zeros))
                .collect(),
        );
    }
    if seams > 0 {
        log::debug!("{seams} face corners disagree on UVs; first assignment kept");
    }

    Ok(data)
}

/// Find the diffuse texture of `material` (or the first textured material) in MTL text
pub fn parse_mtl_texture(input: &str, material: Option<&str>) -> Option<String> {
    let mut current: Option<&str> = None;
    let mut first_texture: Option<&str> = None;

    for raw in input.lines() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if let Ok((_, name)) = parse_name("newmtl")(line) {
            current = Some(name);
        } else if let Ok((_, texture)) = parse_name("map_Kd")(line) {
            // Options such as `-s 1 1 1` may precede the file name
            let file = texture.split_whitespace().last().unwrap_or(texture);
            if material.is_some() && current == material {
                return Some(file.to_string());
            }
            first_texture.get_or_insert(file);
        }
    }

    first_texture.map(str::to_string)
}

/// Load a mask mesh and resolve its texture through the material library
pub fn load_mesh<P: AsRef<Path>>(path: P) -> Result<Mesh> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::asset(path, e.to_string()))?;
    let data = parse_obj(&text).map_err(|reason| Error::asset(path, reason))?;

    if data.positions.len() < LANDMARK_COUNT {
        return Err(Error::asset(
            path,
            format!(
                "topology mismatch: {} vertices, the tracked topology needs {}",
                data.positions.len(),
                LANDMARK_COUNT
            ),
        ));
    }

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let texture = data.material_library.as_ref().and_then(|lib| {
        let lib_path = base.join(lib);
        match std::fs::read_to_string(&lib_path) {
            Ok(mtl) => parse_mtl_texture(&mtl, data.material.as_deref()).map(|t| base.join(t)),
            Err(e) => {
                log::warn!("Material library {} unreadable: {}", lib_path.display(), e);
                None
            }
        }
    });

    log::info!(
        "Loaded {}: {} vertices, {} triangles, uvs: {}, texture: {:?}",
        path.display(),
        data.positions.len(),
        data.triangles.len(),
        data.uvs.is_some(),
        texture
    );

    let topology = Topology {
        triangles: data.triangles,
        uvs: data.uvs,
        texture,
    };
    Mesh::new(data.positions, topology).map_err(|e| match e {
        Error::AssetLoadError { reason, .. } => Error::asset(path, reason),
        other => other,
    })
}

/// Write the mesh's current positions with its fixed topology as OBJ
pub fn write_obj<W: Write>(
    writer: &mut W,
    mesh: &Mesh,
    transform: Option<&Matrix4<f32>>,
) -> std::io::Result<()> {
    writeln!(writer, "# Face mask snapshot")?;
    writeln!(writer, "# vertices: {}", mesh.vertex_count())?;
    writeln!(writer, "# triangles: {}", mesh.triangles().len())?;
    if let Some(texture) = &mesh.topology().texture {
        writeln!(writer, "# texture: {}", texture.display())?;
    }
    writeln!(writer)?;

    for p in mesh.positions() {
        writeln!(writer, "v {:.6} {:.6} {:.6}", p.x, p.y, p.z)?;
    }
    if let Some(uvs) = mesh.uvs() {
        for uv in uvs {
            writeln!(writer, "vt {:.6} {:.6}", uv.x, uv.y)?;
        }
    }
    writeln!(writer)?;

    let with_uv = mesh.uvs().is_some();
    for [a, b, c] in mesh.triangles().iter().map(|f| f.map(|i| i + 1)) {
        if with_uv {
            writeln!(writer, "f {a}/{a} {b}/{b} {c}/{c}")?;
        } else {
            writeln!(writer, "f {a} {b} {c}")?;
        }
    }

    if let Some(m) = transform {
        writeln!(writer, "\n# pose transform")?;
        for row in m.row_iter() {
            writeln!(writer, "# {:.6} {:.6} {:.6} {:.6}", row[0], row[1], row[2], row[3])?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quad_with_uvs() {
        let obj = "\
# comment
mtllib mask.mtl
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
usemtl skin
f 1/1/1 2/2/1 3/3/1 4/4/1
";
        let data = parse_obj(obj).unwrap();
        assert_eq!(data.positions.len(), 4);
        assert_eq!(data.triangles, vec![[0, 1, 2], [0, 2, 3]]);
        let uvs = data.uvs.unwrap();
        assert_eq!(uvs[2], Vector2::new(1.0, 1.0));
        assert_eq!(data.material_library.as_deref(), Some("mask.mtl"));
        assert_eq!(data.material.as_deref(), Some("skin"));
    }

    #[test]
    fn test_parse_negative_and_normal_only_indices() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3//1 -2//1 -1//1\n";
        let data = parse_obj(obj).unwrap();
        assert_eq!(data.triangles, vec![[0, 1, 2]]);
        assert!(data.uvs.is_none());
    }

    #[test]
    fn test_out_of_range_index_is_an_error() {
        let obj = "v 0 0 0\nv 1 0 0\nf 1 2 3\n";
        let err = parse_obj(obj).unwrap_err();
        assert!(err.contains("line 3"));
    }

    #[test]
    fn test_unknown_statements_skipped() {
        let obj = "o mask\ng face\ns off\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        assert_eq!(parse_obj(obj).unwrap().triangles.len(), 1);
    }

    #[test]
    fn test_mtl_texture_lookup() {
        let mtl = "newmtl other\nKd 1 1 1\nnewmtl skin\nmap_Kd -s 1 1 1 face.png\n";
        assert_eq!(parse_mtl_texture(mtl, Some("skin")).as_deref(), Some("face.png"));
        assert_eq!(parse_mtl_texture(mtl, None).as_deref(), Some("face.png"));
        assert_eq!(parse_mtl_texture("newmtl a\n", None), None);
    }

    #[test]
    fn test_write_obj_emits_one_based_faces() {
        let mesh = Mesh::builtin_face();
        let mut out = Vec::new();
        write_obj(&mut out, &mesh, Some(&Matrix4::identity())).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("f 1/1 27/27 28/28"));
        assert!(text.contains("# pose transform"));
        assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), LANDMARK_COUNT);
    }
}

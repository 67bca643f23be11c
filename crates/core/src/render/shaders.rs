/// Pass-through vertex stage for the full-screen quad.
pub const FEEDBACK_VERTEX: &str = r#"#version 330

layout(location = 0) in vec3 positionsIn;
layout(location = 1) in vec2 texCoordsIn;

out vec2 texCoord;

void main() {
    texCoord = texCoordsIn;
    gl_Position = vec4(positionsIn, 1.0);
}
"#;

/// Rotating, zooming feedback of the previous frame with four diamond rings
/// whose brightness follows the spectrum bands.
pub const FEEDBACK_FRAGMENT: &str = r#"#version 330

out vec4 fragColor;

uniform vec2 iResolution;
uniform sampler2D iChannel0;
uniform float iTime;
uniform vec4 iSpectrum;

mat2 rot(float a) {
    float c = cos(a);
    float s = sin(a) + 0.2;
    return mat2(c, s, -s, c);
}

float ring(float radius) {
    return step(1.0, radius) - step(1.025, radius);
}

void main() {
    vec2 centred = gl_FragCoord.xy - 0.5 * iResolution.xy;
    float beat = (iSpectrum.y - 0.5) * 1.5;

    vec2 uv = centred * (2.0 / iResolution.y);
    uv *= 2.0 * rot(iTime + beat);

    vec2 feedbackUv = centred * rot(0.1 * sin(iTime + beat)) * (1.0 + 0.05 * sin(0.5 * iTime + beat));
    feedbackUv = (feedbackUv + 0.5 * iResolution.xy) / iResolution.xy;

    float offset = 0.0005;
    float d0 = abs(uv.x) + abs(uv.y);
    float d1 = abs(uv.x + offset) + abs(uv.y + offset);
    float d2 = abs(uv.x - offset) + abs(uv.y - offset);
    float d3 = abs(uv.x - offset) + abs(uv.y + offset);

    fragColor = 0.95 * texture(iChannel0, feedbackUv);
    fragColor += iSpectrum.x * ring(d0) * vec4(1.0, 0.0, 0.0, 0.0);
    fragColor += iSpectrum.y * ring(d1) * vec4(0.5, 1.0, 0.0, 0.0);
    fragColor += iSpectrum.z * ring(d2) * vec4(0.2, 0.5, 0.0, 0.0);
    fragColor += iSpectrum.w * ring(d3) * vec4(0.0, 0.5, 0.2, 0.0);
}
"#;

/// Pseudo paths the built-in sources are reported under.
pub const FEEDBACK_VERTEX_PATH: &str = "builtin/feedback.vert";
pub const FEEDBACK_FRAGMENT_PATH: &str = "builtin/feedback.frag";
